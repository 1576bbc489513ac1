//! SQLite-family backend: `sqlite_schema` plus pragma table-valued functions.
//!
//! Introspection runs in two phases. `pragma_database_list` names the
//! attached schemas first; the per-schema catalog queries are then combined
//! with `UNION ALL` and fanned out together.

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
    Column, ColumnConstraint, Dialect, DriverFlags, Result, SchemaCollection, Table, Trigger,
};

const SQLITE_COLLATIONS: &[&str] = &["BINARY", "NOCASE", "RTRIM"];

const SQLITE_DATA_TYPES: &[&str] = &["INTEGER", "REAL", "TEXT", "BLOB", "NUMERIC", "BOOLEAN"];

const USER_OBJECTS: &str = r"t.name NOT LIKE 'sqlite\_%' ESCAPE '\'";

#[derive(Deserialize)]
struct DatabaseRow {
    name: String,
}

#[derive(Deserialize)]
struct TableRow {
    schema_name: String,
    table_name: String,
    kind: String,
}

#[derive(Deserialize)]
struct ColumnRow {
    schema_name: String,
    table_name: String,
    name: String,
    #[serde(rename = "type")]
    column_type: Option<String>,
    not_null: i64,
    dflt_value: Option<String>,
    pk: i64,
    auto_increment: Option<i64>,
}

#[derive(Deserialize)]
struct ConstraintRow {
    schema_name: String,
    table_name: String,
    constraint_name: String,
    constraint_type: String,
}

#[derive(Deserialize)]
struct ConstraintColumnRow {
    schema_name: String,
    table_name: String,
    constraint_name: String,
    column_name: String,
    referenced_schema: Option<String>,
    referenced_table: Option<String>,
    referenced_column: Option<String>,
}

#[derive(Deserialize)]
struct TriggerRow {
    schema_name: String,
    name: String,
    table_name: String,
    sql: Option<String>,
}

/// SQLite database or remote libSQL store reached through `C`.
pub struct SqliteDriver<C> {
    connection: C,
    flags: DriverFlags,
}

impl<C: Connection> SqliteDriver<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            flags: DriverFlags::sqlite(),
        }
    }

    /// Remote libSQL store; `big_int` keeps wide integers untruncated.
    pub fn libsql(connection: C, big_int: bool) -> Self {
        Self {
            connection,
            flags: DriverFlags::libsql(big_int),
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
impl<C: Connection> Driver for SqliteDriver<C> {
    fn flags(&self) -> &DriverFlags {
        &self.flags
    }

    fn connection(&self) -> &dyn Connection {
        &self.connection
    }

    fn collation_list(&self) -> &'static [&'static str] {
        SQLITE_COLLATIONS
    }

    fn data_type_suggestions(&self) -> &'static [&'static str] {
        SQLITE_DATA_TYPES
    }

    async fn current_schema(&self) -> Result<Option<String>> {
        Ok(Some(self.flags.default_schema.clone()))
    }

    async fn schemas(&self) -> Result<SchemaCollection> {
        let conn = self.connection();
        let schemas: Vec<String> = fetch_catalog::<DatabaseRow>(
            conn,
            "schemas",
            "SELECT name FROM pragma_database_list WHERE name <> 'temp' ORDER BY seq".to_owned(),
        )
        .await?
        .into_iter()
        .map(|row| row.name)
        .collect();

        if schemas.is_empty() {
            return Ok(SchemaCollection::new());
        }

        let (tables, columns, constraints, constraint_columns, triggers) = futures_util::try_join!(
            fetch_catalog::<TableRow>(conn, "tables", union_all(&schemas, tables_sql)),
            fetch_catalog::<ColumnRow>(
                conn,
                "columns",
                union_all(&schemas, |schema| columns_sql(schema, "")),
            ),
            fetch_catalog::<ConstraintRow>(
                conn,
                "constraints",
                union_all(&schemas, |schema| constraints_sql(schema, "")),
            ),
            fetch_catalog::<ConstraintColumnRow>(
                conn,
                "constraint_columns",
                membership_sql(&schemas, ""),
            ),
            fetch_catalog::<TriggerRow>(conn, "triggers", union_all(&schemas, triggers_sql)),
        )?;

        build_schema_collection(CatalogSnapshot {
            schemas,
            tables: tables.into_iter().filter_map(map_table).collect(),
            columns: columns.into_iter().map(map_column).collect(),
            constraints: constraints.into_iter().filter_map(map_constraint).collect(),
            constraint_columns: constraint_columns.into_iter().map(map_membership).collect(),
            triggers: triggers.into_iter().map(map_trigger).collect(),
        })
    }

    async fn table_schema(&self, schema_name: &str, table_name: &str) -> Result<Table> {
        let conn = self.connection();
        let schemas = [schema_name.to_owned()];
        let filter = format!(" AND t.name = {}", Dialect::Sqlite.escape_text(table_name));

        let (columns, constraints, constraint_columns) = futures_util::try_join!(
            fetch_catalog::<ColumnRow>(conn, "columns", columns_sql(schema_name, &filter)),
            fetch_catalog::<ConstraintRow>(
                conn,
                "constraints",
                constraints_sql(schema_name, &filter),
            ),
            fetch_catalog::<ConstraintColumnRow>(
                conn,
                "constraint_columns",
                membership_sql(&schemas, &filter),
            ),
        )?;

        build_table_schema(
            schema_name,
            table_name,
            columns.into_iter().map(map_column).collect(),
            constraints.into_iter().filter_map(map_constraint).collect(),
            constraint_columns.into_iter().map(map_membership).collect(),
        )
    }
}

fn union_all(schemas: &[String], build: impl Fn(&str) -> String) -> String {
    schemas
        .iter()
        .map(|schema| build(schema))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

fn tables_sql(schema: &str) -> String {
    let (id, lit) = (Dialect::Sqlite.escape_id(schema), Dialect::Sqlite.escape_text(schema));
    format!(
        "SELECT {lit} AS schema_name, t.name AS table_name, t.type AS kind FROM {id}.sqlite_schema AS t WHERE t.type IN ('table', 'view') AND {USER_OBJECTS}"
    )
}

fn columns_sql(schema: &str, filter: &str) -> String {
    let (id, lit) = (Dialect::Sqlite.escape_id(schema), Dialect::Sqlite.escape_text(schema));
    format!(
        "SELECT {lit} AS schema_name, t.name AS table_name, c.name AS name, c.type AS type, c.\"notnull\" AS not_null, c.dflt_value AS dflt_value, c.pk AS pk, (c.pk > 0 AND upper(t.sql) LIKE '%AUTOINCREMENT%') AS auto_increment FROM {id}.sqlite_schema AS t, pragma_table_xinfo(t.name, {lit}) AS c WHERE t.type IN ('table', 'view') AND {USER_OBJECTS} AND c.hidden <> 1{filter}"
    )
}

/// Primary keys are always named `pk`; rowid aliases have no backing index.
fn constraints_sql(schema: &str, filter: &str) -> String {
    let (id, lit) = (Dialect::Sqlite.escape_id(schema), Dialect::Sqlite.escape_text(schema));
    [
        format!("SELECT DISTINCT {lit} AS schema_name, t.name AS table_name, 'pk' AS constraint_name, 'PRIMARY KEY' AS constraint_type FROM {id}.sqlite_schema AS t, pragma_table_info(t.name, {lit}) AS c WHERE t.type = 'table' AND {USER_OBJECTS} AND c.pk > 0{filter}"),
        format!("SELECT {lit}, t.name, i.name, 'UNIQUE' FROM {id}.sqlite_schema AS t, pragma_index_list(t.name, {lit}) AS i WHERE t.type = 'table' AND {USER_OBJECTS} AND i.origin = 'u'{filter}"),
        format!("SELECT DISTINCT {lit}, t.name, 'fk_' || f.id, 'FOREIGN KEY' FROM {id}.sqlite_schema AS t, pragma_foreign_key_list(t.name, {lit}) AS f WHERE t.type = 'table' AND {USER_OBJECTS}{filter}"),
    ]
    .join(" UNION ALL ")
}

fn membership_sql(schemas: &[String], filter: &str) -> String {
    let members = union_all(schemas, |schema| {
        let (id, lit) = (Dialect::Sqlite.escape_id(schema), Dialect::Sqlite.escape_text(schema));
        let target = referenced_column_sql(&lit);
        [
            format!("SELECT {lit} AS schema_name, t.name AS table_name, 'pk' AS constraint_name, c.name AS column_name, NULL AS referenced_schema, NULL AS referenced_table, NULL AS referenced_column, c.pk AS ordinal FROM {id}.sqlite_schema AS t, pragma_table_info(t.name, {lit}) AS c WHERE t.type = 'table' AND {USER_OBJECTS} AND c.pk > 0{filter}"),
            format!("SELECT {lit}, t.name, i.name, ii.name, NULL, NULL, NULL, ii.seqno FROM {id}.sqlite_schema AS t, pragma_index_list(t.name, {lit}) AS i, pragma_index_info(i.name, {lit}) AS ii WHERE t.type = 'table' AND {USER_OBJECTS} AND i.origin = 'u'{filter}"),
            format!("SELECT {lit}, t.name, 'fk_' || f.id, f.\"from\", {lit}, f.\"table\", {target}, f.seq FROM {id}.sqlite_schema AS t, pragma_foreign_key_list(t.name, {lit}) AS f WHERE t.type = 'table' AND {USER_OBJECTS}{filter}"),
        ]
        .join(" UNION ALL ")
    });
    format!("{members} ORDER BY schema_name, table_name, constraint_name, ordinal")
}

/// `REFERENCES parent` without a column list leaves `to` NULL; the target is
/// then the parent's primary key column at the same position.
fn referenced_column_sql(lit: &str) -> String {
    format!(
        "COALESCE(f.\"to\", (SELECT p.name FROM pragma_table_info(f.\"table\", {lit}) AS p WHERE p.pk = f.seq + 1))"
    )
}

fn triggers_sql(schema: &str) -> String {
    let (id, lit) = (Dialect::Sqlite.escape_id(schema), Dialect::Sqlite.escape_text(schema));
    format!(
        "SELECT {lit} AS schema_name, t.name AS name, t.tbl_name AS table_name, t.sql AS sql FROM {id}.sqlite_schema AS t WHERE t.type = 'trigger'"
    )
}

fn map_table(row: TableRow) -> Option<CatalogTable> {
    let kind = match row.kind.as_str() {
        "table" => TableKind::Table,
        "view" => TableKind::View,
        _ => return None,
    };
    Some(CatalogTable {
        schema_name: row.schema_name,
        table_name: row.table_name,
        kind,
        size_in_bytes: None,
    })
}

fn map_column(row: ColumnRow) -> CatalogColumn {
    let constraint = ColumnConstraint {
        not_null: row.not_null != 0,
        primary_key: row.pk > 0,
        auto_increment: row.auto_increment.unwrap_or(0) != 0,
        default_expression: row.dflt_value,
        ..ColumnConstraint::default()
    };
    CatalogColumn {
        schema_name: row.schema_name,
        table_name: row.table_name,
        column: Column::new(row.name, row.column_type.unwrap_or_default())
            .with_constraint(constraint),
    }
}

fn map_constraint(row: ConstraintRow) -> Option<CatalogConstraint> {
    Some(CatalogConstraint {
        kind: CatalogConstraintKind::parse(&row.constraint_type)?,
        schema_name: row.schema_name,
        table_name: row.table_name,
        constraint_name: row.constraint_name,
    })
}

fn map_membership(row: ConstraintColumnRow) -> CatalogConstraintColumn {
    CatalogConstraintColumn {
        schema_name: row.schema_name,
        table_name: row.table_name,
        constraint_name: row.constraint_name,
        column_name: row.column_name,
        referenced_schema: row.referenced_schema,
        referenced_table: row.referenced_table,
        referenced_column: row.referenced_column,
    }
}

fn map_trigger(row: TriggerRow) -> Trigger {
    let statement = row.sql.unwrap_or_default();
    let (timing, event) = parse_trigger_header(&statement);
    Trigger {
        name: row.name,
        table_name: row.table_name,
        schema_name: row.schema_name,
        timing: timing.to_owned(),
        event: event.map(str::to_owned),
        statement,
    }
}

/// Reads timing and event from `CREATE TRIGGER ... ON`. SQLite assumes
/// `BEFORE` when no timing is written.
fn parse_trigger_header(sql: &str) -> (&'static str, Option<&'static str>) {
    let upper = sql.to_ascii_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .take_while(|word| *word != "ON")
        .collect();

    let timing = words
        .iter()
        .find_map(|word| match *word {
            "BEFORE" => Some("BEFORE"),
            "AFTER" => Some("AFTER"),
            "INSTEAD" => Some("INSTEAD OF"),
            _ => None,
        })
        .unwrap_or("BEFORE");
    let event = words.iter().find_map(|word| match *word {
        "INSERT" => Some("INSERT"),
        "UPDATE" => Some("UPDATE"),
        "DELETE" => Some("DELETE"),
        _ => None,
    });
    (timing, event)
}
