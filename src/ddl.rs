//! Schema change requests to ordered DDL statements.
//!
//! Generation is pure: no statement is executed here, and a change the
//! backend cannot perform is rejected instead of being rendered.

use crate::{
    typemap::render_default, Column, Constraint, ConstraintKind, Dialect, DriverError,
    DriverFlags, Result, Table,
};

/// Old/new name pair. `old` absent means the object is new.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rename {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl Rename {
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            old: None,
            new: Some(name.into()),
        }
    }

    pub fn keep(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            old: Some(name.clone()),
            new: Some(name),
        }
    }

    pub fn rename(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: Some(old.into()),
            new: Some(new.into()),
        }
    }
}

/// `old` absent adds the column, `new` absent drops it, both alters it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnChange {
    pub old: Option<Column>,
    pub new: Option<Column>,
}

impl ColumnChange {
    pub fn add(column: Column) -> Self {
        Self {
            old: None,
            new: Some(column),
        }
    }

    pub fn drop(column: Column) -> Self {
        Self {
            old: Some(column),
            new: None,
        }
    }

    pub fn alter(old: Column, new: Column) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }
}

/// Same add/drop/alter convention as [`ColumnChange`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstraintChange {
    pub old: Option<Constraint>,
    pub new: Option<Constraint>,
}

impl ConstraintChange {
    pub fn add(constraint: Constraint) -> Self {
        Self {
            old: None,
            new: Some(constraint),
        }
    }

    pub fn drop(constraint: Constraint) -> Self {
        Self {
            old: Some(constraint),
            new: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableChange {
    pub schema_name: Option<String>,
    pub name: Rename,
    pub columns: Vec<ColumnChange>,
    pub constraints: Vec<ConstraintChange>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseChange {
    pub name: Rename,
    pub collation: Option<String>,
}

/// Generates the statements for a table change.
///
/// `current` is the table as last introspected; when given, columns the
/// change drops or alters must exist in it.
pub fn generate_table_change(
    flags: &DriverFlags,
    current: Option<&Table>,
    change: &TableChange,
) -> Result<Vec<String>> {
    if !flags.support_create_update_table {
        return Err(DriverError::unsupported(
            "table changes are not supported by this backend",
        ));
    }

    let statements = match change.name.old.as_deref() {
        None => vec![create_table(flags.dialect, change)?],
        Some(old_name) => alter_table(flags, current, change, old_name)?,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!("generated {} table change statements", statements.len());

    Ok(statements)
}

/// Generates the statements for a database (schema) change.
pub fn generate_database_change(flags: &DriverFlags, change: &DatabaseChange) -> Result<Vec<String>> {
    if !flags.support_create_update_database {
        return Err(DriverError::unsupported(
            "database changes are not supported by this backend",
        ));
    }
    let dialect = flags.dialect;
    let collate = change
        .collation
        .as_deref()
        .map(collation_name)
        .transpose()?
        .map(|collation| format!(" COLLATE {collation}"))
        .unwrap_or_default();

    match (change.name.old.as_deref(), change.name.new.as_deref()) {
        (None, Some(name)) => Ok(vec![format!(
            "CREATE DATABASE {}{collate}",
            dialect.escape_id(name)
        )]),
        (Some(old), Some(new)) if old != new => Err(DriverError::unsupported(
            "renaming a database is not supported",
        )),
        (Some(name), Some(_)) => Ok(if collate.is_empty() {
            Vec::new()
        } else {
            vec![format!("ALTER DATABASE {}{collate}", dialect.escape_id(name))]
        }),
        (Some(name), None) => Ok(vec![format!("DROP DATABASE {}", dialect.escape_id(name))]),
        (None, None) => Err(DriverError::InvalidChange(
            "database change names neither an old nor a new database".to_owned(),
        )),
    }
}

fn create_table(dialect: Dialect, change: &TableChange) -> Result<String> {
    let name = change
        .name
        .new
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DriverError::InvalidChange("new table has no name".to_owned()))?;

    let mut columns = Vec::with_capacity(change.columns.len());
    for column in &change.columns {
        match (&column.old, &column.new) {
            (None, Some(column)) => columns.push(column),
            _ => {
                return Err(DriverError::InvalidChange(format!(
                    "new table {name} can only add columns"
                )))
            }
        }
    }
    if columns.is_empty() {
        return Err(DriverError::InvalidChange(format!(
            "new table {name} has no columns"
        )));
    }

    let mut constraints = Vec::with_capacity(change.constraints.len());
    for constraint in &change.constraints {
        match (&constraint.old, &constraint.new) {
            (None, Some(constraint)) => constraints.push(constraint),
            _ => {
                return Err(DriverError::InvalidChange(format!(
                    "new table {name} can only add constraints"
                )))
            }
        }
    }

    // A single flagged column gets an inline PRIMARY KEY unless a table-level
    // one is given; several flagged columns become a composite key.
    let has_table_pk = constraints
        .iter()
        .any(|constraint| matches!(constraint.kind, ConstraintKind::PrimaryKey { .. }));
    let pk_columns: Vec<&str> = columns
        .iter()
        .filter(|column| column.pk)
        .map(|column| column.name.as_str())
        .collect();
    let inline_pk = !has_table_pk && pk_columns.len() == 1;

    let mut lines = columns
        .iter()
        .map(|column| column_definition(dialect, column, inline_pk && column.pk))
        .collect::<Result<Vec<_>>>()?;
    if !has_table_pk && pk_columns.len() > 1 {
        lines.push(format!("PRIMARY KEY({})", id_list(dialect, &pk_columns)));
    }
    for constraint in constraints {
        lines.push(constraint_clause(dialect, constraint)?);
    }

    Ok(format!(
        "CREATE TABLE {}(\n  {}\n)",
        dialect.qualify(change.schema_name.as_deref(), name),
        lines.join(",\n  ")
    ))
}

fn alter_table(
    flags: &DriverFlags,
    current: Option<&Table>,
    change: &TableChange,
    old_name: &str,
) -> Result<Vec<String>> {
    let dialect = flags.dialect;
    let schema = change
        .schema_name
        .as_deref()
        .or(current.map(|table| table.schema_name.as_str()));
    let table = dialect.qualify(schema, old_name);
    let alter = |clause: String| format!("ALTER TABLE {table} {clause}");

    let mut constraint_drops = Vec::new();
    let mut constraint_adds = Vec::new();
    for constraint in &change.constraints {
        let (old, new) = match (&constraint.old, &constraint.new) {
            (None, None) => {
                return Err(DriverError::InvalidChange(
                    "constraint change names neither an old nor a new constraint".to_owned(),
                ))
            }
            (Some(old), Some(new)) if old == new => continue,
            pair => pair,
        };
        if !dialect.supports_alter_constraint() {
            return Err(DriverError::unsupported(
                "altering table constraints is not supported by this backend",
            ));
        }
        if let Some(old) = old {
            constraint_drops.push(alter(drop_constraint_clause(dialect, old)?));
        }
        if let Some(new) = new {
            constraint_adds.push(alter(format!("ADD {}", constraint_clause(dialect, new)?)));
        }
    }

    let mut column_drops = Vec::new();
    let mut column_adds = Vec::new();
    let mut column_modifies = Vec::new();
    let mut column_renames = Vec::new();
    for column in &change.columns {
        if let (Some(old), Some(table)) = (&column.old, current) {
            if table.column(&old.name).is_none() {
                return Err(DriverError::InvalidChange(format!(
                    "column {} does not exist in {}",
                    old.name, table.table_name
                )));
            }
        }

        match (&column.old, &column.new) {
            (None, None) => {
                return Err(DriverError::InvalidChange(
                    "column change names neither an old nor a new column".to_owned(),
                ))
            }
            (Some(old), None) => {
                column_drops.push(alter(format!("DROP COLUMN {}", dialect.escape_id(&old.name))));
            }
            (None, Some(new)) => {
                column_adds.push(alter(format!(
                    "ADD COLUMN {}",
                    column_definition(dialect, new, false)?
                )));
            }
            (Some(old), Some(new)) => {
                if old.column_type != new.column_type || old.constraint != new.constraint {
                    if !flags.support_modify_column {
                        return Err(DriverError::unsupported(format!(
                            "modifying column {} is not supported by this backend",
                            old.name
                        )));
                    }
                    // Renames run later, so the definition keeps the old name.
                    let definition = column_definition(
                        dialect,
                        &Column {
                            name: old.name.clone(),
                            ..new.clone()
                        },
                        false,
                    )?;
                    column_modifies.push(alter(match dialect {
                        Dialect::MySql => format!("MODIFY COLUMN {definition}"),
                        Dialect::Sqlite => format!(
                            "ALTER COLUMN {} TO {definition}",
                            dialect.escape_id(&old.name)
                        ),
                    }));
                }
                if old.name != new.name {
                    column_renames.push(alter(format!(
                        "RENAME COLUMN {} TO {}",
                        dialect.escape_id(&old.name),
                        dialect.escape_id(&new.name)
                    )));
                }
            }
        }
    }

    let mut statements = constraint_drops;
    statements.append(&mut column_drops);
    statements.append(&mut column_adds);
    statements.append(&mut column_modifies);
    statements.append(&mut column_renames);
    statements.append(&mut constraint_adds);

    if let Some(new_name) = change.name.new.as_deref() {
        if new_name.is_empty() {
            return Err(DriverError::InvalidChange("table name cannot be empty".to_owned()));
        }
        if new_name != old_name {
            let target = match dialect {
                Dialect::MySql => dialect.qualify(schema, new_name),
                Dialect::Sqlite => dialect.escape_id(new_name),
            };
            statements.push(alter(format!("RENAME TO {target}")));
        }
    }

    Ok(statements)
}

fn column_definition(dialect: Dialect, column: &Column, inline_pk: bool) -> Result<String> {
    if column.name.is_empty() {
        return Err(DriverError::InvalidChange("column name cannot be empty".to_owned()));
    }
    let mut definition = dialect.escape_id(&column.name);
    if !column.column_type.trim().is_empty() {
        definition.push(' ');
        definition.push_str(column.column_type.trim());
    }

    let Some(constraint) = &column.constraint else {
        if inline_pk {
            definition.push_str(" PRIMARY KEY");
        }
        return Ok(definition);
    };

    if constraint.not_null {
        definition.push_str(" NOT NULL");
    }
    if inline_pk {
        definition.push_str(" PRIMARY KEY");
    }
    if constraint.auto_increment {
        match dialect {
            Dialect::MySql => definition.push_str(" AUTO_INCREMENT"),
            Dialect::Sqlite if inline_pk => definition.push_str(" AUTOINCREMENT"),
            Dialect::Sqlite => {
                return Err(DriverError::InvalidChange(format!(
                    "column {} can only auto-increment as the single primary key",
                    column.name
                )))
            }
        }
    }
    if let Some(default) = render_default(dialect, &column.column_type, constraint) {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default);
    }
    if let Some(collate) = constraint.collate.as_deref() {
        definition.push_str(" COLLATE ");
        definition.push_str(collation_name(collate)?);
    }
    Ok(definition)
}

fn constraint_clause(dialect: Dialect, constraint: &Constraint) -> Result<String> {
    if constraint.columns().is_empty() {
        return Err(DriverError::InvalidChange(
            "constraint must cover at least one column".to_owned(),
        ));
    }
    let prefix = constraint
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| format!("CONSTRAINT {} ", dialect.escape_id(name)))
        .unwrap_or_default();

    let body = match &constraint.kind {
        ConstraintKind::PrimaryKey { columns } => {
            format!("PRIMARY KEY({})", id_list(dialect, columns))
        }
        ConstraintKind::Unique { columns } => format!("UNIQUE({})", id_list(dialect, columns)),
        ConstraintKind::ForeignKey(fk) => {
            if fk.foreign_table_name.is_empty() || fk.foreign_columns.len() != fk.columns.len() {
                return Err(DriverError::InvalidChange(
                    "foreign key must reference one column per local column".to_owned(),
                ));
            }
            format!(
                "FOREIGN KEY({}) REFERENCES {}({})",
                id_list(dialect, &fk.columns),
                dialect.qualify(fk.foreign_schema_name.as_deref(), &fk.foreign_table_name),
                id_list(dialect, &fk.foreign_columns)
            )
        }
    };
    Ok(format!("{prefix}{body}"))
}

fn drop_constraint_clause(dialect: Dialect, constraint: &Constraint) -> Result<String> {
    let named = |keyword: &str| {
        constraint
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| format!("DROP {keyword} {}", dialect.escape_id(name)))
            .ok_or_else(|| {
                DriverError::InvalidChange("cannot drop an unnamed constraint".to_owned())
            })
    };
    match constraint.kind {
        ConstraintKind::PrimaryKey { .. } => Ok("DROP PRIMARY KEY".to_owned()),
        ConstraintKind::Unique { .. } => named("INDEX"),
        ConstraintKind::ForeignKey(_) => named("FOREIGN KEY"),
    }
}

fn id_list<S: AsRef<str>>(dialect: Dialect, ids: &[S]) -> String {
    ids.iter()
        .map(|id| dialect.escape_id(id.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collations are emitted bare, so only plain names are accepted.
fn collation_name(collation: &str) -> Result<&str> {
    let valid = !collation.is_empty()
        && collation
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(collation)
    } else {
        Err(DriverError::InvalidChange(format!(
            "invalid collation name '{collation}'"
        )))
    }
}
