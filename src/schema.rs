//! Canonical schema model shared by every backend.

use std::collections::BTreeMap;

use serde::Serialize;

/// Column-level constraint details.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConstraint {
    pub not_null: bool,
    /// Per-column primary-key flag as reported by the catalog.
    pub primary_key: bool,
    pub auto_increment: bool,
    /// Literal default, rendered through the dialect's value escaping.
    pub default_value: Option<String>,
    /// Default SQL expression, emitted verbatim.
    pub default_expression: Option<String>,
    pub collate: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Backend-native type text, e.g. `varchar(255)`.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Set when either the column flag or a primary key constraint marks it.
    pub pk: bool,
    pub constraint: Option<ColumnConstraint>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            pk: false,
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.pk = self.pk || constraint.primary_key;
        self.constraint = Some(constraint);
        self
    }

    pub fn is_not_null(&self) -> bool {
        self.constraint.as_ref().is_some_and(|c| c.not_null)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.constraint.as_ref().is_some_and(|c| c.auto_increment)
    }

    pub(crate) fn constraint_mut(&mut self) -> &mut ColumnConstraint {
        self.constraint.get_or_insert_with(ColumnConstraint::default)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub foreign_schema_name: Option<String>,
    pub foreign_table_name: String,
    pub foreign_columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ConstraintKind {
    PrimaryKey { columns: Vec<String> },
    Unique { columns: Vec<String> },
    ForeignKey(ForeignKey),
}

/// Table-level constraint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn primary_key<I, S>(name: Option<&str>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.map(str::to_owned),
            kind: ConstraintKind::PrimaryKey {
                columns: columns.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn unique<I, S>(name: Option<&str>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.map(str::to_owned),
            kind: ConstraintKind::Unique {
                columns: columns.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn foreign_key(name: Option<&str>, foreign_key: ForeignKey) -> Self {
        Self {
            name: name.map(str::to_owned),
            kind: ConstraintKind::ForeignKey(foreign_key),
        }
    }

    /// Local columns the constraint covers.
    pub fn columns(&self) -> &[String] {
        match &self.kind {
            ConstraintKind::PrimaryKey { columns } | ConstraintKind::Unique { columns } => columns,
            ConstraintKind::ForeignKey(fk) => &fk.columns,
        }
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<String> {
        match &mut self.kind {
            ConstraintKind::PrimaryKey { columns } | ConstraintKind::Unique { columns } => columns,
            ConstraintKind::ForeignKey(fk) => &mut fk.columns,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub size_in_bytes: Option<u64>,
}

/// Table or view shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_name: String,
    pub schema_name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub auto_increment: bool,
    pub stats: TableStats,
}

impl Table {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: schema_name.into(),
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Names of the columns flagged as primary key, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.pk)
            .map(|column| column.name.as_str())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    pub table_name: String,
    pub schema_name: String,
    /// `BEFORE`, `AFTER` or `INSTEAD OF`.
    pub timing: String,
    /// `INSERT`, `UPDATE` or `DELETE` when known.
    pub event: Option<String>,
    pub statement: String,
}

/// One object inside a [`Schema`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "schema", rename_all = "lowercase")]
pub enum SchemaItem {
    Table(Table),
    View(Table),
    Trigger(Trigger),
}

impl SchemaItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Table(table) | Self::View(table) => &table.table_name,
            Self::Trigger(trigger) => &trigger.name,
        }
    }

    pub fn schema_name(&self) -> &str {
        match self {
            Self::Table(table) | Self::View(table) => &table.schema_name,
            Self::Trigger(trigger) => &trigger.schema_name,
        }
    }
}

/// Named namespace, e.g. a MySQL database or an attached SQLite file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub items: Vec<SchemaItem>,
}

impl Schema {
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.items.iter().filter_map(|item| match item {
            SchemaItem::Table(table) => Some(table),
            _ => None,
        })
    }

    pub fn views(&self) -> impl Iterator<Item = &Table> {
        self.items.iter().filter_map(|item| match item {
            SchemaItem::View(view) => Some(view),
            _ => None,
        })
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.items.iter().filter_map(|item| match item {
            SchemaItem::Trigger(trigger) => Some(trigger),
            _ => None,
        })
    }

    /// Table or view named `name`.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.items.iter().find_map(|item| match item {
            SchemaItem::Table(table) | SchemaItem::View(table) if table.table_name == name => {
                Some(table)
            }
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Full introspection result keyed by schema name.
pub type SchemaCollection = BTreeMap<String, Schema>;
