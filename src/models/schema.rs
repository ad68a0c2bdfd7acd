//! Schema-related data models.
//!
//! Two layers live here: the raw rows each dialect adapter reports in its
//! native shape, and the normalized entities returned to callers.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::connection::DatabaseType;

/// A `(schema, name)` pair identifying a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub schema: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.name`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Wire shape of a table listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl From<ObjectRef> for TableRef {
    fn from(r: ObjectRef) -> Self {
        Self {
            schema: r.schema,
            table: r.name,
        }
    }
}

/// Wire shape of a view listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    pub schema: String,
    pub view: String,
}

impl From<ObjectRef> for ViewRef {
    fn from(r: ObjectRef) -> Self {
        Self {
            schema: r.schema,
            view: r.name,
        }
    }
}

// =============================================================================
// Raw adapter rows
// =============================================================================

/// Column row as reported by a dialect catalog.
#[derive(Debug, Clone, Default)]
pub struct RawColumn {
    pub name: String,
    /// Native type spelling, e.g. `character varying`, `int(11)`, `nvarchar`
    pub data_type: String,
    /// Character length (-1 for `max`)
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    /// Native nullability encoding (`YES`/`NO`, `1`/`0`, ...)
    pub is_nullable: String,
    pub default_value: Option<String>,
}

/// One row per (index, column) pair.
#[derive(Debug, Clone, Default)]
pub struct RawIndexColumn {
    pub index_name: String,
    pub column_name: Option<String>,
    /// 1-based position of the column within the index
    pub seq: i64,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: String,
}

/// Storage figure as an engine exposes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSize {
    Bytes(u64),
    /// 8 KiB data pages (SQL Server)
    Pages(u64),
}

impl RawSize {
    pub const PAGE_SIZE: u64 = 8192;

    pub fn bytes(self) -> u64 {
        match self {
            Self::Bytes(b) => b,
            Self::Pages(p) => p.saturating_mul(Self::PAGE_SIZE),
        }
    }
}

/// Statistical row estimate plus optional on-disk size for one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTableStats {
    /// Catalog estimate; engines report -1 for "never analyzed"
    pub row_estimate: i64,
    pub size: Option<RawSize>,
}

/// Column search hit.
#[derive(Debug, Clone)]
pub struct RawColumnMatch {
    pub table: ObjectRef,
    pub column: RawColumn,
}

// =============================================================================
// Normalized entities
// =============================================================================

/// Normalized nullability.
///
/// Serialized as the `YES`/`NO` strings callers already expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    Nullable,
    NotNull,
    Unknown,
}

impl Nullability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nullable => "YES",
            Self::NotNull => "NO",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for Nullability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Nullability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "YES" => Self::Nullable,
            "NO" => Self::NotNull,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: Nullability,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDetails {
    pub schema: String,
    pub table: String,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<String>,
}

/// Ordered index column names.
///
/// Serialized as one `", "`-joined string; accepts a string or an array on input.
/// Names containing a comma or a double quote are written double-quoted (with
/// `""` escaping) so the joined form splits back into the same names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexColumns(pub Vec<String>);

impl IndexColumns {
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(|name| {
                if name.contains(',') || name.contains('"') {
                    format!("\"{}\"", name.replace('"', "\"\""))
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Split the joined form back into names.
    pub fn parse(joined: &str) -> Self {
        let mut names = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut chars = joined.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' if quoted && chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => quoted = !quoted,
                ',' if !quoted => names.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        names.push(current);

        IndexColumns(
            names
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl Serialize for IndexColumns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.joined())
    }
}

impl<'de> Deserialize<'de> for IndexColumns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = IndexColumns;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a column name, a comma-separated list, or an array of names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(IndexColumns::parse(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut names = Vec::new();
                while let Some(name) = seq.next_element::<String>()? {
                    names.push(name);
                }
                Ok(IndexColumns(names))
            }
        }

        deserializer.deserialize_any(ColumnsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(alias = "index")]
    pub index_name: String,
    #[serde(alias = "column")]
    pub columns: IndexColumns,
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary: bool,
    pub index_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndexes {
    pub schema: String,
    pub table: String,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseOverview {
    pub db_type: DatabaseType,
    pub tables_count: u64,
    pub views_count: u64,
    pub schemas_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_size: Option<String>,
}

/// A table containing a searched column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: Nullability,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSearchResult {
    pub column: String,
    pub tables: Vec<ColumnMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub schema: String,
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    View,
    Table,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub schema: String,
    pub name: String,
    pub kind: NodeKind,
}

/// Directed edge from a view to an object it reads from, both `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDependencies {
    pub schema: String,
    pub view: String,
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarGroup {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTables {
    pub threshold: f64,
    pub groups: Vec<SimilarGroup>,
}
