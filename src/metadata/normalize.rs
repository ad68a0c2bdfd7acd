//! Normalization rules applied to every adapter result.
//!
//! All three dialects pass through the same functions here, so callers see one
//! spelling for types, one nullability encoding and one size format.

use crate::models::{
    ColumnInfo, ColumnMatch, IndexColumns, IndexInfo, Nullability, RawColumn, RawColumnMatch,
    RawIndexColumn, RawSize,
};
use humansize::{WINDOWS, format_size};

/// Placeholder for index keys that are expressions rather than plain columns.
pub const EXPRESSION_KEY: &str = "(expression)";

/// Character and binary types whose declared length belongs in the label.
const LENGTH_TYPES: &[&str] = &[
    "varchar",
    "char",
    "nvarchar",
    "nchar",
    "varbinary",
    "binary",
    "bit varying",
];

/// Integer types whose MySQL display width carries no meaning.
const INTEGER_TYPES: &[&str] = &["tinyint", "smallint", "mediumint", "int", "bigint"];

/// Map a native base type name to its shared spelling.
pub fn canonical_type_name(base: &str) -> String {
    let lower = base.trim().to_lowercase();
    let mapped = match lower.as_str() {
        "character varying" => "varchar",
        "character" => "char",
        "integer" | "int4" => "int",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "double precision" | "float8" => "double",
        "float4" => "real",
        "timestamp without time zone" => "timestamp",
        "timestamp with time zone" => "timestamptz",
        "time without time zone" => "time",
        "time with time zone" => "timetz",
        other => other,
    };
    mapped.to_string()
}

/// Byte offset of the `)` closing the group that opens `args`, skipping quoted
/// enum/set literals.
fn closing_paren(args: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in args.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => quoted = true,
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Build the normalized type label for one raw column.
///
/// Types that already carry a parenthesized suffix (MySQL `COLUMN_TYPE`) keep it,
/// except integer display widths which are dropped. Otherwise length, precision
/// and scale reported separately by the catalog are appended.
pub fn normalize_type(column: &RawColumn) -> String {
    let raw = column.data_type.trim();

    if let Some(open) = raw.find('(') {
        let base = canonical_type_name(&raw[..open]);
        let (args, tail) = match closing_paren(&raw[open..]) {
            Some(close) => (&raw[open..open + close + 1], raw[open + close + 1..].trim()),
            None => (&raw[open..], ""),
        };

        let mut label = base.clone();
        if !INTEGER_TYPES.contains(&base.as_str()) {
            label.push_str(args);
        }
        if !tail.is_empty() {
            label.push(' ');
            label.push_str(&tail.to_lowercase());
        }
        return label;
    }

    let base = canonical_type_name(raw);

    if LENGTH_TYPES.contains(&base.as_str()) {
        if let Some(len) = column.max_length {
            return if len < 0 {
                format!("{}(max)", base)
            } else {
                format!("{}({})", base, len)
            };
        }
    }

    if base == "numeric" || base == "decimal" {
        match (column.numeric_precision, column.numeric_scale) {
            (Some(p), Some(s)) => return format!("{}({},{})", base, p, s),
            (Some(p), None) => return format!("{}({})", base, p),
            _ => {}
        }
    }

    base
}

/// Collapse the engine's nullability encoding into [`Nullability`].
pub fn normalize_nullability(raw: &str) -> Nullability {
    match raw.trim().to_uppercase().as_str() {
        "YES" | "Y" | "1" | "TRUE" => Nullability::Nullable,
        "NO" | "N" | "0" | "FALSE" => Nullability::NotNull,
        _ => Nullability::Unknown,
    }
}

/// Trim a default expression and strip redundant outer parentheses
/// (SQL Server reports `((0))` for `0`).
pub fn normalize_default(raw: Option<&str>) -> Option<String> {
    let mut value = raw?.trim();
    while value.starts_with('(') && value.ends_with(')') && outer_parens_match(value) {
        value = value[1..value.len() - 1].trim();
    }
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// True when the opening parenthesis at index 0 closes at the last character.
fn outer_parens_match(value: &str) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let last = value.len() - 1;
    for (i, c) in value.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Render a raw size with binary units.
pub fn format_raw_size(size: RawSize) -> String {
    format_size(size.bytes(), WINDOWS)
}

/// Negative estimates ("never analyzed") become 0.
pub fn normalize_row_count(estimate: i64) -> u64 {
    estimate.max(0) as u64
}

pub fn normalize_column(column: &RawColumn) -> ColumnInfo {
    ColumnInfo {
        name: column.name.clone(),
        data_type: normalize_type(column),
        nullable: normalize_nullability(&column.is_nullable),
        default: normalize_default(column.default_value.as_deref()),
    }
}

pub fn normalize_column_match(hit: &RawColumnMatch) -> ColumnMatch {
    let column = normalize_column(&hit.column);
    ColumnMatch {
        schema: hit.table.schema.clone(),
        table: hit.table.name.clone(),
        data_type: column.data_type,
        nullable: column.nullable,
        default: column.default,
    }
}

/// Group per-column index rows into one entry per index.
///
/// Indexes keep the order in which the catalog first reported them; columns
/// within an index are ordered by their key position.
pub fn group_indexes(rows: Vec<RawIndexColumn>) -> Vec<IndexInfo> {
    let mut grouped: Vec<(IndexInfo, Vec<(i64, String)>)> = Vec::new();

    for row in rows {
        let column = row
            .column_name
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EXPRESSION_KEY.to_string());

        match grouped
            .iter_mut()
            .find(|(info, _)| info.index_name == row.index_name)
        {
            Some((info, columns)) => {
                info.is_unique |= row.is_unique;
                info.is_primary |= row.is_primary;
                columns.push((row.seq, column));
            }
            None => grouped.push((
                IndexInfo {
                    index_name: row.index_name,
                    columns: IndexColumns::default(),
                    is_unique: row.is_unique || row.is_primary,
                    is_primary: row.is_primary,
                    index_type: normalize_index_type(&row.index_type),
                },
                vec![(row.seq, column)],
            )),
        }
    }

    grouped
        .into_iter()
        .map(|(mut info, mut columns)| {
            columns.sort_by_key(|(seq, _)| *seq);
            info.columns = IndexColumns(columns.into_iter().map(|(_, name)| name).collect());
            info
        })
        .collect()
}

/// `btree`, `BTREE`, `CLUSTERED` ... all reported upper-case.
pub fn normalize_index_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "UNKNOWN".to_string()
    } else {
        trimmed.to_uppercase()
    }
}
