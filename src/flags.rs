use serde::Serialize;

use crate::Value;

/// SQL dialect spoken by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(rename = "mysql")]
    MySql,
    Sqlite,
}

impl Dialect {
    /// Quotes an identifier, doubling any embedded delimiter.
    ///
    /// MySQL uses backticks, SQLite uses double quotes.
    pub fn escape_id(self, id: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", id.replace('`', "``")),
            Self::Sqlite => format!("\"{}\"", id.replace('"', "\"\"")),
        }
    }

    /// Renders a literal value.
    pub fn escape_value(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_owned(),
            Value::Integer(value) => value.to_string(),
            Value::BigInt(value) => value.clone(),
            // SQL has no NaN or infinity literal
            Value::Float(value) if !value.is_finite() => "NULL".to_owned(),
            Value::Float(value) => value.to_string(),
            Value::Text(value) => self.escape_text(value),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }

    /// Renders a string literal.
    ///
    /// MySQL treats backslash as an escape character in string literals under
    /// its default SQL mode, so it is doubled as well.
    pub fn escape_text(self, text: &str) -> String {
        let escaped = text.replace('\'', "''");
        match self {
            Self::MySql => format!("'{}'", escaped.replace('\\', "\\\\")),
            Self::Sqlite => format!("'{escaped}'"),
        }
    }

    /// Qualifies `name` with `schema` unless the schema is empty.
    pub fn qualify(self, schema: Option<&str>, name: &str) -> String {
        match schema.filter(|schema| !schema.is_empty()) {
            Some(schema) => format!("{}.{}", self.escape_id(schema), self.escape_id(name)),
            None => self.escape_id(name),
        }
    }

    /// Whether `ALTER TABLE` can add or drop table constraints.
    pub fn supports_alter_constraint(self) -> bool {
        matches!(self, Self::MySql)
    }
}

/// Static per-driver feature record; read-only after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverFlags {
    pub dialect: Dialect,
    pub default_schema: String,
    pub optional_schema: bool,
    pub support_big_int: bool,
    pub support_modify_column: bool,
    pub support_create_update_table: bool,
    pub support_create_update_database: bool,
    pub support_use_statement: bool,
    pub support_row_id: bool,
    pub support_insert_returning: bool,
    pub support_update_returning: bool,
    pub mismatch_detection: bool,
}

impl DriverFlags {
    pub fn mysql() -> Self {
        Self {
            dialect: Dialect::MySql,
            default_schema: String::new(),
            optional_schema: false,
            support_big_int: false,
            support_modify_column: true,
            support_create_update_table: true,
            support_create_update_database: true,
            support_use_statement: true,
            support_row_id: false,
            support_insert_returning: false,
            support_update_returning: false,
            mismatch_detection: false,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            default_schema: "main".to_owned(),
            optional_schema: true,
            support_big_int: false,
            support_modify_column: false,
            support_create_update_table: true,
            support_create_update_database: false,
            support_use_statement: false,
            support_row_id: true,
            support_insert_returning: true,
            support_update_returning: true,
            mismatch_detection: false,
        }
    }

    /// Remote libSQL store: SQLite flags plus column modification, and
    /// big-integer mode when requested.
    pub fn libsql(big_int: bool) -> Self {
        Self {
            support_big_int: big_int,
            support_modify_column: true,
            mismatch_detection: big_int,
            ..Self::sqlite()
        }
    }
}
