//! Backend-native type names to canonical column types.

use serde::Serialize;

use crate::{ColumnConstraint, Dialect, Value};

/// Small closed set of canonical types used for display and literal rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    #[default]
    Unknown,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real | Self::Boolean)
    }
}

/// Maps a declared type for `dialect`. `None` or blank maps to `Unknown`.
pub fn canonical_type(dialect: Dialect, declared: Option<&str>) -> ColumnType {
    let Some(declared) = declared.map(str::trim).filter(|t| !t.is_empty()) else {
        return ColumnType::Unknown;
    };
    match dialect {
        Dialect::Sqlite => sqlite_type(declared),
        Dialect::MySql => mysql_type(declared),
    }
}

/// SQLite declared-type affinity, checked in the engine's order.
fn sqlite_type(declared: &str) -> ColumnType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        ColumnType::Integer
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        ColumnType::Text
    } else if upper.contains("BLOB") {
        ColumnType::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        ColumnType::Real
    } else if upper.contains("BOOL") {
        ColumnType::Boolean
    } else if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

fn mysql_type(declared: &str) -> ColumnType {
    let lower = declared.to_ascii_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    if matches!(lower.as_str(), "tinyint(1)" | "bit(1)") || matches!(base, "bool" | "boolean") {
        return ColumnType::Boolean;
    }

    match base {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            ColumnType::Integer
        }
        "float" | "double" | "real" | "decimal" | "numeric" | "dec" | "fixed" => ColumnType::Real,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
        | "json" | "date" | "datetime" | "timestamp" | "time" => ColumnType::Text,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit" => {
            ColumnType::Blob
        }
        _ => ColumnType::Unknown,
    }
}

/// Renders the `DEFAULT` operand of a column, if it has one.
///
/// Expressions are emitted verbatim. Literal defaults stay bare when the
/// column is numeric and the value parses as a number; everything else goes
/// through the dialect's literal escaping.
pub fn render_default(
    dialect: Dialect,
    declared: &str,
    constraint: &ColumnConstraint,
) -> Option<String> {
    if let Some(expression) = &constraint.default_expression {
        return Some(expression.clone());
    }
    let value = constraint.default_value.as_deref()?;
    let numeric = canonical_type(dialect, Some(declared)).is_numeric();
    if numeric && value.trim().parse::<f64>().is_ok_and(f64::is_finite) {
        Some(value.trim().to_owned())
    } else {
        Some(dialect.escape_value(&Value::text(value)))
    }
}
