use std::sync::Mutex;

use async_trait::async_trait;
use studio_driver::{
    ddl::{ColumnChange, Rename, TableChange},
    Column, ColumnConstraint, Connection, ConstraintKind, Driver, DriverError, MySqlDriver,
    RawResult, Statement, Value,
};

/// Answers catalog queries by the `information_schema` view they read.
struct CatalogConnection {
    fail_on: Option<&'static str>,
    log: Mutex<Vec<String>>,
}

impl CatalogConnection {
    fn new() -> Self {
        Self {
            fail_on: None,
            log: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(view: &'static str) -> Self {
        Self {
            fail_on: Some(view),
            ..Self::new()
        }
    }
}

fn raw(columns: &[&str], rows: Vec<Vec<Value>>) -> RawResult {
    RawResult {
        columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        column_types: Vec::new(),
        rows,
        ..RawResult::default()
    }
}

fn t(value: &str) -> Value {
    Value::text(value)
}

fn catalog_result(sql: &str) -> RawResult {
    if sql.contains("information_schema.SCHEMATA") {
        return raw(&["SCHEMA_NAME"], vec![vec![t("shop")], vec![t("archive")]]);
    }
    if sql.contains("information_schema.tables") {
        return raw(
            &["TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE", "DATA_LENGTH", "INDEX_LENGTH"],
            vec![
                vec![t("shop"), t("customers"), t("BASE TABLE"), Value::integer(16384), Value::integer(0)],
                vec![t("shop"), t("orders"), t("BASE TABLE"), Value::integer(16384), Value::integer(16384)],
                vec![t("shop"), t("recent_orders"), t("VIEW"), Value::Null, Value::Null],
            ],
        );
    }
    if sql.contains("information_schema.columns") {
        let columns = [
            "TABLE_SCHEMA",
            "TABLE_NAME",
            "COLUMN_NAME",
            "COLUMN_TYPE",
            "EXTRA",
            "COLUMN_KEY",
            "IS_NULLABLE",
            "COLUMN_DEFAULT",
            "COLLATION_NAME",
        ];
        return raw(
            &columns,
            vec![
                vec![t("shop"), t("customers"), t("id"), t("int"), t("auto_increment"), t("PRI"), t("NO"), Value::Null, Value::Null],
                vec![t("shop"), t("customers"), t("email"), t("varchar(255)"), t(""), t("UNI"), t("NO"), Value::Null, t("utf8mb4_general_ci")],
                vec![t("shop"), t("orders"), t("id"), t("bigint"), t(""), t(""), t("NO"), Value::Null, Value::Null],
                vec![t("shop"), t("orders"), t("customer_id"), t("int"), t(""), t("MUL"), t("YES"), Value::Null, Value::Null],
                vec![t("shop"), t("orders"), t("status"), t("varchar(16)"), t(""), t(""), t("NO"), t("pending"), t("utf8mb4_general_ci")],
                vec![t("shop"), t("orders"), t("created_at"), t("datetime"), t("DEFAULT_GENERATED"), t(""), t("NO"), t("CURRENT_TIMESTAMP"), Value::Null],
                vec![t("shop"), t("recent_orders"), t("id"), t("bigint"), t(""), t(""), t("NO"), Value::Null, Value::Null],
            ],
        );
    }
    if sql.contains("information_schema.table_constraints") {
        return raw(
            &["TABLE_SCHEMA", "TABLE_NAME", "CONSTRAINT_NAME", "CONSTRAINT_TYPE"],
            vec![
                vec![t("shop"), t("customers"), t("PRIMARY"), t("PRIMARY KEY")],
                vec![t("shop"), t("customers"), t("email"), t("UNIQUE")],
                vec![t("shop"), t("orders"), t("PRIMARY"), t("PRIMARY KEY")],
                vec![t("shop"), t("orders"), t("fk_orders_customer"), t("FOREIGN KEY")],
            ],
        );
    }
    if sql.contains("information_schema.key_column_usage") {
        return raw(
            &[
                "CONSTRAINT_NAME",
                "TABLE_SCHEMA",
                "TABLE_NAME",
                "COLUMN_NAME",
                "REFERENCED_TABLE_SCHEMA",
                "REFERENCED_TABLE_NAME",
                "REFERENCED_COLUMN_NAME",
            ],
            vec![
                vec![t("PRIMARY"), t("shop"), t("customers"), t("id"), Value::Null, Value::Null, Value::Null],
                vec![t("email"), t("shop"), t("customers"), t("email"), Value::Null, Value::Null, Value::Null],
                // The column flag misses this key; the membership row must set it.
                vec![t("PRIMARY"), t("shop"), t("orders"), t("id"), Value::Null, Value::Null, Value::Null],
                vec![t("fk_orders_customer"), t("shop"), t("orders"), t("customer_id"), t("shop"), t("customers"), t("id")],
            ],
        );
    }
    if sql.contains("information_schema.triggers") {
        return raw(
            &[
                "TRIGGER_SCHEMA",
                "TRIGGER_NAME",
                "EVENT_MANIPULATION",
                "EVENT_OBJECT_TABLE",
                "ACTION_TIMING",
                "ACTION_STATEMENT",
            ],
            vec![vec![
                t("shop"),
                t("orders_touch"),
                t("UPDATE"),
                t("orders"),
                t("BEFORE"),
                t("SET NEW.status = 'changed'"),
            ]],
        );
    }
    if sql.contains("DATABASE()") {
        return raw(&["db"], vec![vec![t("shop")]]);
    }
    raw(&[], Vec::new())
}

#[async_trait]
impl Connection for CatalogConnection {
    async fn execute(&self, statement: Statement) -> studio_driver::Result<RawResult> {
        self.log
            .lock()
            .expect("sql log mutex must not be poisoned")
            .push(statement.sql.clone());
        if let Some(view) = self.fail_on {
            if statement.sql.contains(view) {
                return Err(DriverError::Http {
                    status: 500,
                    body: "catalog unavailable".to_owned(),
                });
            }
        }
        Ok(catalog_result(&statement.sql))
    }

    async fn batch(&self, statements: Vec<Statement>) -> studio_driver::Result<Vec<RawResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute(statement).await?);
        }
        Ok(results)
    }
}

fn logged_sql(driver: &MySqlDriver<CatalogConnection>) -> Vec<String> {
    driver
        .get_ref()
        .log
        .lock()
        .expect("sql log mutex must not be poisoned")
        .clone()
}

#[tokio::test]
async fn schemas_join_all_catalog_queries() {
    let driver = MySqlDriver::new(CatalogConnection::new());

    let collection = driver.schemas().await.expect("introspection must succeed");

    assert_eq!(collection.keys().collect::<Vec<_>>(), ["archive", "shop"]);
    assert!(collection["archive"].is_empty());

    let shop = &collection["shop"];
    let customers = shop.table("customers").expect("customers must exist");
    assert!(customers.auto_increment);
    assert_eq!(customers.primary_key(), ["id"]);
    assert_eq!(customers.stats.size_in_bytes, Some(16384));
    let email = customers
        .column("email")
        .and_then(|column| column.constraint.as_ref())
        .expect("email must carry a constraint");
    assert!(email.not_null);
    assert_eq!(email.collate.as_deref(), Some("utf8mb4_general_ci"));
    assert_eq!(email.default_expression, None);

    let orders = shop.table("orders").expect("orders must exist");
    assert!(!orders.auto_increment);
    assert_eq!(orders.primary_key(), ["id"]);
    assert_eq!(orders.stats.size_in_bytes, Some(32768));

    let constraint = |name: &str| {
        orders
            .column(name)
            .and_then(|column| column.constraint.clone())
            .expect("column must carry a constraint")
    };
    assert_eq!(constraint("customer_id").default_expression.as_deref(), Some("NULL"));
    assert_eq!(constraint("status").default_value.as_deref(), Some("pending"));
    assert_eq!(
        constraint("created_at").default_expression.as_deref(),
        Some("CURRENT_TIMESTAMP")
    );

    let fk = orders
        .constraints
        .iter()
        .find_map(|constraint| match &constraint.kind {
            ConstraintKind::ForeignKey(fk) => Some(fk),
            _ => None,
        })
        .expect("orders must carry a foreign key");
    assert_eq!(fk.foreign_schema_name.as_deref(), Some("shop"));
    assert_eq!(fk.foreign_table_name, "customers");
    assert_eq!(fk.columns, ["customer_id"]);
    assert_eq!(fk.foreign_columns, ["id"]);

    let view = shop.views().next().expect("view must exist");
    assert_eq!(view.table_name, "recent_orders");
    assert_eq!(view.columns.len(), 1);

    let trigger = shop.triggers().next().expect("trigger must exist");
    assert_eq!(trigger.table_name, "orders");
    assert_eq!(trigger.timing, "BEFORE");
    assert_eq!(trigger.event.as_deref(), Some("UPDATE"));

    let log = logged_sql(&driver)
        .into_iter()
        .filter(|sql| sql.contains("information_schema"))
        .collect::<Vec<_>>();
    assert_eq!(log.len(), 6);
    for sql in &log {
        assert!(
            sql.contains("NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')"),
            "system schemas must be excluded: {sql}"
        );
    }
}

#[tokio::test]
async fn any_failing_catalog_query_aborts_introspection() {
    let driver = MySqlDriver::new(CatalogConnection::failing_on("information_schema.columns"));

    let err = driver.schemas().await.expect_err("introspection must fail");

    match err {
        DriverError::CatalogQuery { catalog, source } => {
            assert_eq!(catalog, "columns");
            assert!(matches!(*source, DriverError::Http { status: 500, .. }));
        }
        other => panic!("expected catalog query error, got {other:?}"),
    }
}

#[tokio::test]
async fn table_schema_scopes_queries_to_one_table() {
    let driver = MySqlDriver::new(CatalogConnection::new());

    let orders = driver
        .table_schema("shop", "orders")
        .await
        .expect("table schema must succeed");

    assert_eq!(orders.table_name, "orders");
    assert_eq!(
        orders.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["id", "customer_id", "status", "created_at"]
    );
    assert_eq!(orders.constraints.len(), 2);
    assert!(orders.column("id").is_some_and(|c| c.pk));

    let log = logged_sql(&driver);
    assert_eq!(log.len(), 3);
    assert!(log
        .iter()
        .all(|sql| sql.contains("TABLE_SCHEMA = 'shop' AND TABLE_NAME = 'orders'")));
}

#[tokio::test]
async fn current_schema_reads_selected_database() {
    let driver = MySqlDriver::new(CatalogConnection::new());
    assert_eq!(
        driver.current_schema().await.expect("must resolve"),
        Some("shop".to_owned())
    );
}

#[tokio::test]
async fn introspected_table_drives_column_modification() {
    let driver = MySqlDriver::new(CatalogConnection::new());
    let orders = driver
        .table_schema("shop", "orders")
        .await
        .expect("table schema must succeed");

    let status = orders.column("status").cloned().expect("status must exist");
    let widened = Column {
        column_type: "varchar(32)".to_owned(),
        ..status.clone()
    };
    let change = TableChange {
        schema_name: None,
        name: Rename::keep("orders"),
        columns: vec![
            ColumnChange::alter(status, widened),
            ColumnChange::add(Column::new("note", "text").with_constraint(ColumnConstraint {
                default_value: Some(r"C:\temp 'x'".to_owned()),
                ..ColumnConstraint::default()
            })),
        ],
        constraints: Vec::new(),
    };

    let statements = driver
        .create_update_table_schema(Some(&orders), &change)
        .expect("ddl must generate");
    assert_eq!(
        statements,
        [
            r"ALTER TABLE `shop`.`orders` ADD COLUMN `note` text DEFAULT 'C:\\temp ''x'''",
            "ALTER TABLE `shop`.`orders` MODIFY COLUMN `status` varchar(32) NOT NULL DEFAULT 'pending' COLLATE utf8mb4_general_ci",
        ]
    );
    assert_eq!(driver.escape_id("a`b"), "`a``b`");
    assert!(driver.collation_list().contains(&"utf8mb4_general_ci"));
}
