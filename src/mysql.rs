//! MySQL-family backend: `information_schema` catalog queries.

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    connection::Connection,
    driver::Driver,
    introspect::{
        build_schema_collection, build_table_schema, fetch_catalog, CatalogColumn,
        CatalogConstraint, CatalogConstraintColumn, CatalogConstraintKind, CatalogSnapshot,
        CatalogTable, TableKind,
    },
    Column, ColumnConstraint, Dialect, DriverFlags, Result, SchemaCollection, Statement, Table,
    Trigger, Value,
};

const SYSTEM_SCHEMAS: &str = "('mysql', 'information_schema', 'performance_schema', 'sys')";

const MYSQL_COLLATIONS: &[&str] = &[
    "utf8mb4_0900_ai_ci",
    "utf8mb4_0900_as_ci",
    "utf8mb4_0900_as_cs",
    "utf8mb4_0900_bin",
    "utf8mb4_bin",
    "utf8mb4_general_ci",
    "utf8mb4_unicode_ci",
    "utf8mb4_unicode_520_ci",
    "utf8mb3_general_ci",
    "utf8mb3_bin",
    "utf8mb3_unicode_ci",
    "latin1_swedish_ci",
    "latin1_general_ci",
    "latin1_general_cs",
    "latin1_bin",
    "ascii_general_ci",
    "ascii_bin",
    "binary",
];

const MYSQL_DATA_TYPES: &[&str] = &[
    "int",
    "bigint",
    "smallint",
    "tinyint",
    "mediumint",
    "decimal(10,2)",
    "double",
    "float",
    "boolean",
    "varchar(255)",
    "char(36)",
    "text",
    "mediumtext",
    "longtext",
    "json",
    "enum",
    "date",
    "datetime",
    "timestamp",
    "time",
    "year",
    "binary(16)",
    "varbinary(255)",
    "blob",
    "longblob",
];

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct SchemaRow {
    schema_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct TableRow {
    table_schema: String,
    table_name: String,
    table_type: String,
    data_length: Option<u64>,
    index_length: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ColumnRow {
    table_schema: String,
    table_name: String,
    column_name: String,
    column_type: String,
    extra: Option<String>,
    column_key: Option<String>,
    is_nullable: String,
    column_default: Option<String>,
    collation_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ConstraintRow {
    table_schema: String,
    table_name: String,
    constraint_name: String,
    constraint_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct KeyColumnRow {
    constraint_name: String,
    table_schema: String,
    table_name: String,
    column_name: String,
    referenced_table_schema: Option<String>,
    referenced_table_name: Option<String>,
    referenced_column_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct TriggerRow {
    trigger_schema: String,
    trigger_name: String,
    event_manipulation: Option<String>,
    event_object_table: String,
    action_timing: String,
    action_statement: String,
}

/// MySQL, MariaDB and compatible servers reached through `C`.
pub struct MySqlDriver<C> {
    connection: C,
    flags: DriverFlags,
}

impl<C: Connection> MySqlDriver<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            flags: DriverFlags::mysql(),
        }
    }

    pub fn get_ref(&self) -> &C {
        &self.connection
    }

    pub fn into_inner(self) -> C {
        self.connection
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl<C: Connection> Driver for MySqlDriver<C> {
    fn flags(&self) -> &DriverFlags {
        &self.flags
    }

    fn connection(&self) -> &dyn Connection {
        &self.connection
    }

    fn collation_list(&self) -> &'static [&'static str] {
        MYSQL_COLLATIONS
    }

    fn data_type_suggestions(&self) -> &'static [&'static str] {
        MYSQL_DATA_TYPES
    }

    async fn current_schema(&self) -> Result<Option<String>> {
        let result = self.query(Statement::from("SELECT DATABASE() AS db")).await?;
        Ok(result
            .first_value("db")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }

    async fn schemas(&self) -> Result<SchemaCollection> {
        let conn = self.connection();
        let (schemas, tables, columns, constraints, constraint_columns, triggers) = futures_util::try_join!(
            fetch_catalog::<SchemaRow>(
                conn,
                "schemas",
                format!(
                    "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME NOT IN {SYSTEM_SCHEMAS}"
                ),
            ),
            fetch_catalog::<TableRow>(
                conn,
                "tables",
                format!(
                    "SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE, DATA_LENGTH, INDEX_LENGTH FROM information_schema.tables WHERE TABLE_SCHEMA NOT IN {SYSTEM_SCHEMAS}"
                ),
            ),
            fetch_catalog::<ColumnRow>(
                conn,
                "columns",
                format!(
                    "SELECT {COLUMN_FIELDS} FROM information_schema.columns WHERE TABLE_SCHEMA NOT IN {SYSTEM_SCHEMAS} ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION"
                ),
            ),
            fetch_catalog::<ConstraintRow>(
                conn,
                "constraints",
                format!(
                    "SELECT {CONSTRAINT_FIELDS} FROM information_schema.table_constraints WHERE TABLE_SCHEMA NOT IN {SYSTEM_SCHEMAS} AND {CONSTRAINT_TYPES}"
                ),
            ),
            fetch_catalog::<KeyColumnRow>(
                conn,
                "constraint_columns",
                format!(
                    "SELECT {KEY_COLUMN_FIELDS} FROM information_schema.key_column_usage WHERE TABLE_SCHEMA NOT IN {SYSTEM_SCHEMAS} ORDER BY ORDINAL_POSITION"
                ),
            ),
            fetch_catalog::<TriggerRow>(
                conn,
                "triggers",
                format!(
                    "SELECT TRIGGER_SCHEMA, TRIGGER_NAME, EVENT_MANIPULATION, EVENT_OBJECT_TABLE, ACTION_TIMING, ACTION_STATEMENT FROM information_schema.triggers WHERE TRIGGER_SCHEMA NOT IN {SYSTEM_SCHEMAS}"
                ),
            ),
        )?;

        build_schema_collection(CatalogSnapshot {
            schemas: schemas.into_iter().map(|row| row.schema_name).collect(),
            tables: tables.into_iter().map(map_table).collect(),
            columns: columns.into_iter().map(map_column).collect(),
            constraints: constraints.into_iter().filter_map(map_constraint).collect(),
            constraint_columns: constraint_columns.into_iter().map(map_key_column).collect(),
            triggers: triggers.into_iter().map(map_trigger).collect(),
        })
    }

    async fn table_schema(&self, schema_name: &str, table_name: &str) -> Result<Table> {
        let conn = self.connection();
        let scope = format!(
            "TABLE_SCHEMA = {} AND TABLE_NAME = {}",
            Dialect::MySql.escape_text(schema_name),
            Dialect::MySql.escape_text(table_name)
        );
        let (columns, constraints, constraint_columns) = futures_util::try_join!(
            fetch_catalog::<ColumnRow>(
                conn,
                "columns",
                format!(
                    "SELECT {COLUMN_FIELDS} FROM information_schema.columns WHERE {scope} ORDER BY ORDINAL_POSITION"
                ),
            ),
            fetch_catalog::<ConstraintRow>(
                conn,
                "constraints",
                format!(
                    "SELECT {CONSTRAINT_FIELDS} FROM information_schema.table_constraints WHERE {scope} AND {CONSTRAINT_TYPES}"
                ),
            ),
            fetch_catalog::<KeyColumnRow>(
                conn,
                "constraint_columns",
                format!(
                    "SELECT {KEY_COLUMN_FIELDS} FROM information_schema.key_column_usage WHERE {scope} ORDER BY ORDINAL_POSITION"
                ),
            ),
        )?;

        build_table_schema(
            schema_name,
            table_name,
            columns.into_iter().map(map_column).collect(),
            constraints.into_iter().filter_map(map_constraint).collect(),
            constraint_columns.into_iter().map(map_key_column).collect(),
        )
    }
}

const COLUMN_FIELDS: &str = "TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, EXTRA, COLUMN_KEY, IS_NULLABLE, COLUMN_DEFAULT, COLLATION_NAME";
const CONSTRAINT_FIELDS: &str = "TABLE_SCHEMA, TABLE_NAME, CONSTRAINT_NAME, CONSTRAINT_TYPE";
const CONSTRAINT_TYPES: &str = "CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')";
const KEY_COLUMN_FIELDS: &str = "CONSTRAINT_NAME, TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_SCHEMA, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME";

fn map_table(row: TableRow) -> CatalogTable {
    let size_in_bytes = match (row.data_length, row.index_length) {
        (None, None) => None,
        (data, index) => Some(data.unwrap_or(0) + index.unwrap_or(0)),
    };
    CatalogTable {
        schema_name: row.table_schema,
        table_name: row.table_name,
        kind: if row.table_type.eq_ignore_ascii_case("VIEW") {
            TableKind::View
        } else {
            TableKind::Table
        },
        size_in_bytes,
    }
}

fn map_column(row: ColumnRow) -> CatalogColumn {
    let extra = row.extra.unwrap_or_default().to_ascii_lowercase();
    let nullable = !row.is_nullable.eq_ignore_ascii_case("NO");

    let mut constraint = ColumnConstraint {
        not_null: !nullable,
        primary_key: row.column_key.as_deref() == Some("PRI"),
        auto_increment: extra.contains("auto_increment"),
        collate: row.collation_name,
        ..ColumnConstraint::default()
    };
    match row.column_default {
        None if nullable => constraint.default_expression = Some("NULL".to_owned()),
        None => {}
        Some(default) if extra.contains("default_generated") => {
            constraint.default_expression = Some(default)
        }
        Some(default) => constraint.default_value = Some(default),
    }

    CatalogColumn {
        schema_name: row.table_schema,
        table_name: row.table_name,
        column: Column::new(row.column_name, row.column_type).with_constraint(constraint),
    }
}

fn map_constraint(row: ConstraintRow) -> Option<CatalogConstraint> {
    Some(CatalogConstraint {
        kind: CatalogConstraintKind::parse(&row.constraint_type)?,
        schema_name: row.table_schema,
        table_name: row.table_name,
        constraint_name: row.constraint_name,
    })
}

fn map_key_column(row: KeyColumnRow) -> CatalogConstraintColumn {
    CatalogConstraintColumn {
        schema_name: row.table_schema,
        table_name: row.table_name,
        constraint_name: row.constraint_name,
        column_name: row.column_name,
        referenced_schema: row.referenced_table_schema,
        referenced_table: row.referenced_table_name,
        referenced_column: row.referenced_column_name,
    }
}

fn map_trigger(row: TriggerRow) -> Trigger {
    Trigger {
        name: row.trigger_name,
        table_name: row.event_object_table,
        schema_name: row.trigger_schema,
        timing: row.action_timing,
        event: row.event_manipulation,
        statement: row.action_statement,
    }
}
