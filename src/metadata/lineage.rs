//! View dependency extraction.
//!
//! View definitions are parsed with the engine's `sqlparser` dialect and every
//! relation they read from is collected. CTE names are not real objects and
//! are dropped. The recursive walk over referenced views lives in the
//! metadata service; this module only parses and accumulates the graph.

use crate::models::{DatabaseType, DependencyEdge, DependencyNode, NodeKind, ObjectRef};
use sqlparser::ast::{ObjectName, Query, Visit, Visitor};
use sqlparser::dialect::{Dialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::{Parser, ParserError};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

pub const DEFAULT_MAX_DEPTH: u32 = 5;
pub const MAX_DEPTH_LIMIT: u32 = 10;

/// Clamp a requested recursion depth; the root view is always expanded.
pub fn clamp_depth(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_MAX_DEPTH).clamp(1, MAX_DEPTH_LIMIT)
}

/// A relation name as written in the view text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationName {
    pub schema: Option<String>,
    pub name: String,
}

impl RelationName {
    /// Unqualified names resolve to the referencing view's schema.
    pub fn resolve(&self, default_schema: &str) -> ObjectRef {
        ObjectRef::new(
            self.schema.as_deref().unwrap_or(default_schema),
            self.name.as_str(),
        )
    }
}

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SqlServer => Box::new(MsSqlDialect {}),
    }
}

#[derive(Default)]
struct RelationCollector {
    relations: Vec<RelationName>,
    cte_names: HashSet<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_names.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts: Vec<String> = relation
            .0
            .iter()
            .filter_map(|part| part.as_ident().map(|ident| ident.value.clone()))
            .collect();

        // database.schema.name keeps the last two parts
        let relation = match parts.as_slice() {
            [] => return ControlFlow::Continue(()),
            [name] => RelationName {
                schema: None,
                name: name.clone(),
            },
            [.., schema, name] => RelationName {
                schema: Some(schema.clone()),
                name: name.clone(),
            },
        };

        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        ControlFlow::Continue(())
    }
}

/// SQL Server stores the full `CREATE VIEW ... AS` statement; fall back to
/// the query body when the header uses options the parser rejects.
fn query_body(definition: &str) -> Option<&str> {
    let upper = definition.to_uppercase();
    let bytes = upper.as_bytes();
    let mut search = 0;
    while let Some(found) = upper[search..].find("AS") {
        let start = search + found;
        let end = start + 2;
        let boundary_before = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let boundary_after = end < bytes.len() && bytes[end].is_ascii_whitespace();
        if boundary_before && boundary_after {
            let rest = upper[end..].trim_start();
            if rest.starts_with("SELECT") || rest.starts_with("WITH") {
                let offset = upper.len() - rest.len();
                return Some(&definition[offset..]);
            }
        }
        search = end;
    }
    None
}

/// Extract the relations a view definition reads from, in first-seen order.
pub fn extract_relations(
    definition: &str,
    db_type: DatabaseType,
) -> Result<Vec<RelationName>, ParserError> {
    let dialect = dialect_for(db_type);
    let statements = match Parser::parse_sql(dialect.as_ref(), definition) {
        Ok(statements) => statements,
        Err(e) => match query_body(definition) {
            Some(body) => Parser::parse_sql(dialect.as_ref(), body)?,
            None => return Err(e),
        },
    };

    let mut collector = RelationCollector::default();
    let _ = statements.visit(&mut collector);

    Ok(collector
        .relations
        .into_iter()
        .filter(|r| r.schema.is_some() || !collector.cte_names.contains(&r.name.to_lowercase()))
        .collect())
}

/// Accumulates nodes and edges in discovery order without duplicates.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    seen_edges: HashSet<DependencyEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, upgrading `Unknown` when a more specific kind is learned.
    pub fn add_node(&mut self, object: &ObjectRef, kind: NodeKind) {
        let key = object.qualified();
        match self.index.get(&key) {
            Some(&i) => {
                if self.nodes[i].kind == NodeKind::Unknown {
                    self.nodes[i].kind = kind;
                }
            }
            None => {
                self.index.insert(key, self.nodes.len());
                self.nodes.push(DependencyNode {
                    schema: object.schema.clone(),
                    name: object.name.clone(),
                    kind,
                });
            }
        }
    }

    pub fn add_edge(&mut self, from: &ObjectRef, to: &ObjectRef) {
        let edge = DependencyEdge {
            from: from.qualified(),
            to: to.qualified(),
        };
        if self.seen_edges.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }

    pub fn into_parts(self) -> (Vec<DependencyNode>, Vec<DependencyEdge>) {
        (self.nodes, self.edges)
    }
}
