use async_trait::async_trait;

use crate::{
    connection::Connection,
    ddl::{generate_database_change, generate_table_change, DatabaseChange, TableChange},
    transform::{transform, TransformOptions},
    DriverFlags, QueryResultSet, Result, SchemaCollection, Statement, Table, Value,
};

/// One backend behind the canonical model.
///
/// Implementors supply the flags, the connection and the catalog queries;
/// querying, transactions, DDL generation and escaping are shared.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Driver: Send + Sync {
    fn flags(&self) -> &DriverFlags;

    fn connection(&self) -> &dyn Connection;

    /// Full introspection of every non-system schema.
    async fn schemas(&self) -> Result<SchemaCollection>;

    async fn table_schema(&self, schema_name: &str, table_name: &str) -> Result<Table>;

    async fn current_schema(&self) -> Result<Option<String>>;

    fn collation_list(&self) -> &'static [&'static str];

    /// Column types offered when editing a table definition.
    fn data_type_suggestions(&self) -> &'static [&'static str];

    async fn query(&self, statement: Statement) -> Result<QueryResultSet> {
        let raw = self.connection().execute(statement).await?;
        transform(raw, TransformOptions::from_flags(self.flags()))
    }

    /// Runs `statements` atomically and transforms every result.
    async fn transaction(&self, statements: Vec<Statement>) -> Result<Vec<QueryResultSet>> {
        let options = TransformOptions::from_flags(self.flags());
        self.connection()
            .batch(statements)
            .await?
            .into_iter()
            .map(|raw| transform(raw, options))
            .collect()
    }

    fn create_update_table_schema(
        &self,
        current: Option<&Table>,
        change: &TableChange,
    ) -> Result<Vec<String>> {
        generate_table_change(self.flags(), current, change)
    }

    fn create_update_database_schema(&self, change: &DatabaseChange) -> Result<Vec<String>> {
        generate_database_change(self.flags(), change)
    }

    fn escape_id(&self, id: &str) -> String {
        self.flags().dialect.escape_id(id)
    }

    fn escape_value(&self, value: &Value) -> String {
        self.flags().dialect.escape_value(value)
    }
}
