//! Catalog rows to the canonical schema graph.
//!
//! Drivers only issue their catalog queries and map the native rows into the
//! backend-neutral `Catalog*` shapes below. The join itself is a pure
//! function over those rows:
//!
//! 1. schema name -> empty item list (seeded from the schemas query),
//! 2. `(schema, table)` -> table shell (seeded from the tables query),
//! 3. `(schema, table, constraint)` -> constraint shell (seeded from the
//!    constraints query),
//!
//! then the columns and constraint-membership rows are streamed once each.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::{
    connection::Connection, Column, Constraint, ConstraintKind, DriverError, ForeignKey,
    RawResult, Result, Schema, SchemaCollection, SchemaItem, Statement, Table, TableStats,
    Trigger,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Table,
    View,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogTable {
    pub schema_name: String,
    pub table_name: String,
    pub kind: TableKind,
    pub size_in_bytes: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogColumn {
    pub schema_name: String,
    pub table_name: String,
    pub column: Column,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
}

impl CatalogConstraintKind {
    /// Parses `PRIMARY KEY`, `UNIQUE` and `FOREIGN KEY`.
    pub fn parse(constraint_type: &str) -> Option<Self> {
        match constraint_type.trim().to_ascii_uppercase().as_str() {
            "PRIMARY KEY" => Some(Self::PrimaryKey),
            "UNIQUE" => Some(Self::Unique),
            "FOREIGN KEY" => Some(Self::ForeignKey),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogConstraint {
    pub schema_name: String,
    pub table_name: String,
    pub constraint_name: String,
    pub kind: CatalogConstraintKind,
}

/// One `(constraint, column)` membership row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogConstraintColumn {
    pub schema_name: String,
    pub table_name: String,
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_schema: Option<String>,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
}

/// Every catalog result needed for a full introspection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub schemas: Vec<String>,
    pub tables: Vec<CatalogTable>,
    pub columns: Vec<CatalogColumn>,
    pub constraints: Vec<CatalogConstraint>,
    pub constraint_columns: Vec<CatalogConstraintColumn>,
    pub triggers: Vec<Trigger>,
}

/// Joins a catalog snapshot into a [`SchemaCollection`].
///
/// Tables listed under a schema missing from `schemas` are dropped, as are
/// columns and constraints whose table is unknown.
pub fn build_schema_collection(snapshot: CatalogSnapshot) -> Result<SchemaCollection> {
    let CatalogSnapshot {
        schemas,
        tables,
        columns,
        constraints,
        constraint_columns,
        triggers,
    } = snapshot;

    let mut join = TableJoin::default();
    for table in tables {
        join.seed_table(table);
    }
    join.attach_columns(columns);
    join.attach_constraints(constraints);
    join.attach_memberships(constraint_columns)?;

    let mut collection: SchemaCollection = schemas
        .into_iter()
        .map(|name| (name, Schema::default()))
        .collect();

    for (kind, table) in join.finish() {
        let Some(schema) = collection.get_mut(&table.schema_name) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "skipping table {}.{} outside the listed schemas",
                table.schema_name,
                table.table_name
            );
            continue;
        };
        schema.items.push(match kind {
            TableKind::Table => SchemaItem::Table(table),
            TableKind::View => SchemaItem::View(table),
        });
    }

    for trigger in triggers {
        if let Some(schema) = collection.get_mut(&trigger.schema_name) {
            schema.items.push(SchemaItem::Trigger(trigger));
        }
    }

    Ok(collection)
}

/// Builds one table from catalog rows already scoped to it.
pub fn build_table_schema(
    schema_name: &str,
    table_name: &str,
    columns: Vec<CatalogColumn>,
    constraints: Vec<CatalogConstraint>,
    constraint_columns: Vec<CatalogConstraintColumn>,
) -> Result<Table> {
    let mut join = TableJoin::default();
    join.seed_table(CatalogTable {
        schema_name: schema_name.to_owned(),
        table_name: table_name.to_owned(),
        kind: TableKind::Table,
        size_in_bytes: None,
    });
    join.attach_columns(columns);
    join.attach_constraints(constraints);
    join.attach_memberships(constraint_columns)?;

    join.finish()
        .into_iter()
        .next()
        .map(|(_, table)| table)
        .ok_or_else(|| DriverError::Decode(format!("table {schema_name}.{table_name} missing")))
}

type TableKey = (String, String);
type ConstraintKey = (String, String, String);

/// Hash-join state: tables in catalog order plus the two lookups.
#[derive(Default)]
struct TableJoin {
    tables: Vec<(TableKind, Table)>,
    table_index: HashMap<TableKey, usize>,
    /// Constraint key -> (table position, constraint position).
    constraint_index: HashMap<ConstraintKey, (usize, usize)>,
    /// First referenced (schema, table) seen per foreign key.
    fk_targets: HashMap<ConstraintKey, ForeignTarget>,
}

type ForeignTarget = (Option<String>, Option<String>);

fn target_name(target: &ForeignTarget) -> String {
    match target {
        (Some(schema), Some(table)) => format!("{schema}.{table}"),
        (None, Some(table)) => table.clone(),
        (Some(schema), None) => format!("{schema}.?"),
        (None, None) => "?".to_owned(),
    }
}

impl TableJoin {
    fn seed_table(&mut self, row: CatalogTable) {
        let key = (row.schema_name.clone(), row.table_name.clone());
        let mut table = Table::new(row.schema_name, row.table_name);
        table.stats = TableStats {
            size_in_bytes: row.size_in_bytes,
        };
        self.table_index.insert(key, self.tables.len());
        self.tables.push((row.kind, table));
    }

    fn attach_columns(&mut self, rows: Vec<CatalogColumn>) {
        for row in rows {
            let key = (row.schema_name, row.table_name);
            let Some(&position) = self.table_index.get(&key) else {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "skipping column {} of unknown table {}.{}",
                    row.column.name,
                    key.0,
                    key.1
                );
                continue;
            };
            let table = &mut self.tables[position].1;
            table.auto_increment |= row.column.is_auto_increment();
            table.columns.push(row.column);
        }
    }

    fn attach_constraints(&mut self, rows: Vec<CatalogConstraint>) {
        for row in rows {
            let Some(&position) = self
                .table_index
                .get(&(row.schema_name.clone(), row.table_name.clone()))
            else {
                continue;
            };
            let (kind, table) = &mut self.tables[position];
            if *kind == TableKind::View {
                continue;
            }

            let name = Some(row.constraint_name.as_str());
            let constraint = match row.kind {
                CatalogConstraintKind::PrimaryKey => {
                    Constraint::primary_key(name, Vec::<String>::new())
                }
                CatalogConstraintKind::Unique => Constraint::unique(name, Vec::<String>::new()),
                CatalogConstraintKind::ForeignKey => Constraint::foreign_key(
                    name,
                    ForeignKey {
                        columns: Vec::new(),
                        foreign_schema_name: None,
                        foreign_table_name: String::new(),
                        foreign_columns: Vec::new(),
                    },
                ),
            };

            self.constraint_index.insert(
                (row.schema_name, row.table_name, row.constraint_name),
                (position, table.constraints.len()),
            );
            table.constraints.push(constraint);
        }
    }

    fn attach_memberships(&mut self, rows: Vec<CatalogConstraintColumn>) -> Result<()> {
        for row in rows {
            let key = (
                row.schema_name.clone(),
                row.table_name.clone(),
                row.constraint_name.clone(),
            );
            let Some(&(table_position, constraint_position)) = self.constraint_index.get(&key)
            else {
                continue;
            };
            let table = &mut self.tables[table_position].1;
            let constraint = &mut table.constraints[constraint_position];
            constraint.columns_mut().push(row.column_name.clone());

            match &mut constraint.kind {
                ConstraintKind::PrimaryKey { .. } => {
                    if let Some(column) = table
                        .columns
                        .iter_mut()
                        .find(|column| column.name == row.column_name)
                    {
                        column.pk = true;
                    }
                }
                ConstraintKind::Unique { .. } => {}
                ConstraintKind::ForeignKey(fk) => {
                    let target = (row.referenced_schema, row.referenced_table);
                    match self.fk_targets.get(&key) {
                        Some(first) if *first != target => {
                            return Err(DriverError::AmbiguousForeignKey {
                                schema: row.schema_name,
                                table: row.table_name,
                                constraint: row.constraint_name,
                                first: target_name(first),
                                second: target_name(&target),
                            });
                        }
                        Some(_) => {}
                        None => {
                            fk.foreign_schema_name = target.0.clone();
                            fk.foreign_table_name = target.1.clone().unwrap_or_default();
                            self.fk_targets.insert(key, target);
                        }
                    }
                    if let Some(column) = row.referenced_column {
                        fk.foreign_columns.push(column);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Vec<(TableKind, Table)> {
        self.tables
    }
}

/// Runs one catalog query and decodes every row into `T` by column label.
///
/// Any failure, transport or decode, is reported as
/// [`DriverError::CatalogQuery`] naming `catalog`.
pub(crate) async fn fetch_catalog<T: DeserializeOwned>(
    connection: &dyn Connection,
    catalog: &'static str,
    sql: String,
) -> Result<Vec<T>> {
    let raw = connection
        .execute(Statement::new(sql, ()))
        .await
        .map_err(|err| DriverError::catalog(catalog, err))?;
    let rows = decode_rows(raw).map_err(|err| DriverError::catalog(catalog, err))?;

    #[cfg(feature = "tracing")]
    tracing::debug!("catalog query {} returned {} rows", catalog, rows.len());

    Ok(rows)
}

fn decode_rows<T: DeserializeOwned>(raw: RawResult) -> Result<Vec<T>> {
    raw.rows
        .into_iter()
        .map(|row| {
            if row.len() != raw.columns.len() {
                return Err(DriverError::Transform(format!(
                    "catalog row has {} values, expected {}",
                    row.len(),
                    raw.columns.len()
                )));
            }
            let object = raw
                .columns
                .iter()
                .zip(row)
                .map(|(name, value)| {
                    serde_json::to_value(value).map(|value| (name.clone(), value))
                })
                .collect::<std::result::Result<serde_json::Map<_, _>, _>>()
                .map_err(|err| DriverError::Decode(format!("invalid catalog value: {err}")))?;
            serde_json::from_value(serde_json::Value::Object(object))
                .map_err(|err| DriverError::Decode(format!("invalid catalog row: {err}")))
        })
        .collect()
}
