//! Dialect-agnostic metadata façade.
//!
//! Every operation resolves the active session, calls the matching adapter
//! capability under the query timeout, and normalizes the raw result. Errors
//! keep their kind and are tagged with the object being inspected.

use crate::db::{ConnectionSession, DialectAdapter};
use crate::error::{DbError, DbResult};
use crate::metadata::lineage::{self, GraphBuilder};
use crate::metadata::normalize::{
    format_raw_size, group_indexes, normalize_column, normalize_column_match, normalize_row_count,
};
use crate::metadata::similarity::{clamp_threshold, group_similar};
use crate::models::{
    ColumnSearchResult, DatabaseOverview, NodeKind, ObjectRef, SimilarTables, TableDetails,
    TableIndexes, TableRef, ViewDefinition, ViewDependencies, ViewRef,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MetadataService {
    session: ConnectionSession,
    query_timeout: Duration,
}

impl MetadataService {
    pub fn new(session: ConnectionSession, query_timeout: Duration) -> Self {
        Self {
            session,
            query_timeout,
        }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Run one adapter call under the query timeout.
    ///
    /// A timed-out call is dropped; the pool discards the interrupted
    /// connection and the session stays usable.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => {
                debug!(
                    operation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Metadata query finished"
                );
                result
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Metadata query timed out"
                );
                Err(DbError::timeout(operation, self.query_timeout))
            }
        }
    }

    /// Aggregate counts and size of the attached database.
    pub async fn overview(&self) -> DbResult<DatabaseOverview> {
        let session = self.session.current().await?;
        let adapter = session.adapter();

        let (schemas_count, tables_count, views_count, size) = futures_util::try_join!(
            self.timed("count_schemas", adapter.count_schemas()),
            self.timed("count_tables", adapter.count_tables()),
            self.timed("count_views", adapter.count_views()),
            self.timed("database_size", adapter.database_size()),
        )?;

        Ok(DatabaseOverview {
            db_type: adapter.db_type(),
            tables_count,
            views_count,
            schemas_count,
            database_size: size.map(format_raw_size),
        })
    }

    pub async fn list_tables(&self) -> DbResult<Vec<TableRef>> {
        let session = self.session.current().await?;
        let tables = self
            .timed("list_tables", session.adapter().list_tables())
            .await?;
        Ok(tables.into_iter().map(TableRef::from).collect())
    }

    pub async fn list_views(&self) -> DbResult<Vec<ViewRef>> {
        let session = self.session.current().await?;
        let views = self
            .timed("list_views", session.adapter().list_views())
            .await?;
        Ok(views.into_iter().map(ViewRef::from).collect())
    }

    /// Row estimate, columns and size of one table.
    pub async fn table_details(&self, schema: &str, table: &str) -> DbResult<TableDetails> {
        let object = object_ref(schema, "table", table)?;
        let qualified = object.qualified();
        let session = self.session.current().await?;
        let adapter = session.adapter();

        debug!(schema = %object.schema, table = %object.name, "Fetching table details");

        let stats = self
            .timed("table_stats", adapter.table_stats(&object))
            .await
            .map_err(|e| e.with_object(&qualified))?
            .ok_or_else(|| DbError::not_found("Table", &qualified))?;

        let columns = self
            .timed("table_columns", adapter.table_columns(&object))
            .await
            .map_err(|e| e.with_object(&qualified))?;

        Ok(TableDetails {
            schema: object.schema,
            table: object.name,
            row_count: normalize_row_count(stats.row_estimate),
            columns: columns.iter().map(normalize_column).collect(),
            estimated_size: stats.size.map(format_raw_size),
        })
    }

    /// Indexes of one table, one entry per index.
    pub async fn table_indexes(&self, schema: &str, table: &str) -> DbResult<TableIndexes> {
        let object = object_ref(schema, "table", table)?;
        let qualified = object.qualified();
        let session = self.session.current().await?;
        let adapter = session.adapter();

        debug!(schema = %object.schema, table = %object.name, "Fetching table indexes");

        let exists = self
            .timed("table_exists", adapter.table_exists(&object))
            .await
            .map_err(|e| e.with_object(&qualified))?;
        if !exists {
            return Err(DbError::not_found("Table", qualified));
        }

        let rows = self
            .timed("table_indexes", adapter.table_indexes(&object))
            .await
            .map_err(|e| e.with_object(&qualified))?;

        Ok(TableIndexes {
            schema: object.schema,
            table: object.name,
            indexes: group_indexes(rows),
        })
    }

    /// Every table carrying a column with this name.
    pub async fn search_columns(&self, column_name: &str) -> DbResult<ColumnSearchResult> {
        let column = column_name.trim();
        if column.is_empty() {
            return Err(DbError::invalid_input("column_name must not be empty"));
        }
        let session = self.session.current().await?;

        let hits = self
            .timed("find_columns", session.adapter().find_columns(column))
            .await?;

        Ok(ColumnSearchResult {
            column: column.to_string(),
            tables: hits.iter().map(normalize_column_match).collect(),
        })
    }

    pub async fn view_definition(&self, schema: &str, view: &str) -> DbResult<ViewDefinition> {
        let object = object_ref(schema, "view", view)?;
        let qualified = object.qualified();
        let session = self.session.current().await?;

        let definition = self
            .timed("view_definition", session.adapter().view_definition(&object))
            .await
            .map_err(|e| e.with_object(&qualified))?
            .ok_or_else(|| DbError::not_found("View", &qualified))?;

        Ok(ViewDefinition {
            schema: object.schema,
            view: object.name,
            definition,
        })
    }

    /// Walk the objects a view reads from, expanding referenced views up to
    /// `max_depth` levels.
    pub async fn view_dependencies(
        &self,
        schema: &str,
        view: &str,
        max_depth: Option<u32>,
    ) -> DbResult<ViewDependencies> {
        let root = object_ref(schema, "view", view)?;
        let root_qualified = root.qualified();
        let max_depth = lineage::clamp_depth(max_depth);
        let session = self.session.current().await?;
        let adapter = session.adapter();
        let db_type = adapter.db_type();

        let root_definition = self
            .timed("view_definition", adapter.view_definition(&root))
            .await
            .map_err(|e| e.with_object(&root_qualified))?
            .ok_or_else(|| DbError::not_found("View", &root_qualified))?;

        let catalog = Catalog::load(self, adapter).await?;
        let (root, _) = catalog.resolve(root);
        let (schema, view) = (root.schema.clone(), root.name.clone());

        let mut graph = GraphBuilder::new();
        graph.add_node(&root, NodeKind::View);

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root_qualified.to_lowercase());

        let mut pending = VecDeque::new();
        pending.push_back((root, root_definition, 0u32));

        while let Some((current, definition, depth)) = pending.pop_front() {
            let Some(sql) = definition else {
                continue;
            };

            let relations = match lineage::extract_relations(&sql, db_type) {
                Ok(relations) => relations,
                Err(e) => {
                    warn!(
                        db_type = %db_type,
                        view = %current,
                        error = %e,
                        "Could not parse view definition"
                    );
                    continue;
                }
            };

            for relation in relations {
                let (target, kind) = catalog.resolve(relation.resolve(&current.schema));
                if target == current {
                    continue;
                }

                graph.add_node(&target, kind);
                graph.add_edge(&current, &target);

                if !visited.insert(target.qualified().to_lowercase()) {
                    continue;
                }

                if kind == NodeKind::View && depth + 1 < max_depth {
                    let qualified = target.qualified();
                    let nested = self
                        .timed("view_definition", adapter.view_definition(&target))
                        .await
                        .map_err(|e| e.with_object(&qualified))?
                        .flatten();
                    pending.push_back((target, nested, depth + 1));
                }
            }
        }

        let (nodes, edges) = graph.into_parts();
        debug!(
            view = %root_qualified,
            max_depth,
            nodes = nodes.len(),
            edges = edges.len(),
            "Resolved view dependencies"
        );

        Ok(ViewDependencies {
            schema,
            view,
            nodes,
            edges,
        })
    }

    /// Groups of tables with similar qualified names.
    pub async fn similar_tables(&self, threshold: Option<f64>) -> DbResult<SimilarTables> {
        let threshold = clamp_threshold(threshold);
        let session = self.session.current().await?;
        let tables = self
            .timed("list_tables", session.adapter().list_tables())
            .await?;

        Ok(SimilarTables {
            threshold,
            groups: group_similar(&tables, threshold),
        })
    }
}

/// Tables and views of the attached database keyed by lower-cased qualified name.
struct Catalog {
    objects: HashMap<String, (ObjectRef, NodeKind)>,
}

impl Catalog {
    async fn load(service: &MetadataService, adapter: &dyn DialectAdapter) -> DbResult<Self> {
        let (tables, views) = futures_util::try_join!(
            service.timed("list_tables", adapter.list_tables()),
            service.timed("list_views", adapter.list_views()),
        )?;

        let mut objects = HashMap::with_capacity(tables.len() + views.len());
        for (object, kind) in tables
            .into_iter()
            .map(|t| (t, NodeKind::Table))
            .chain(views.into_iter().map(|v| (v, NodeKind::View)))
        {
            objects.insert(object.qualified().to_lowercase(), (object, kind));
        }
        Ok(Self { objects })
    }

    /// Catalog spelling and kind of a referenced object.
    fn resolve(&self, reference: ObjectRef) -> (ObjectRef, NodeKind) {
        match self.objects.get(&reference.qualified().to_lowercase()) {
            Some((object, kind)) => (object.clone(), *kind),
            None => (reference, NodeKind::Unknown),
        }
    }
}

/// Build an object reference from request fields, rejecting blanks.
fn object_ref(schema: &str, kind: &str, name: &str) -> DbResult<ObjectRef> {
    let schema = schema.trim();
    let name = name.trim();
    if schema.is_empty() {
        return Err(DbError::invalid_input("schema must not be empty"));
    }
    if name.is_empty() {
        return Err(DbError::invalid_input(format!("{} must not be empty", kind)));
    }
    Ok(ObjectRef::new(schema, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_trims() {
        let object = object_ref(" public ", "table", " users ").unwrap();
        assert_eq!(object, ObjectRef::new("public", "users"));
    }

    #[test]
    fn test_object_ref_rejects_blank_fields() {
        assert!(matches!(
            object_ref("", "table", "users"),
            Err(DbError::InvalidInput { .. })
        ));
        let err = object_ref("public", "view", "  ").unwrap_err();
        assert!(err.to_string().contains("view must not be empty"));
    }
}
