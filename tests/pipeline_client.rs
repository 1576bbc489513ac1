use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::{json, Value as JsonValue};
use studio_driver::{
    ClientOptions, Connection, Driver, DriverError, PipelineClient, SqliteDriver, Statement,
    Value,
};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: JsonValue) -> Self {
        Self::json(StatusCode::OK, body)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<JsonValue>>>,
    hits: Arc<AtomicUsize>,
}

async fn pipeline_handler(State(state): State<MockState>, body: String) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(request) = serde_json::from_str::<JsonValue>(&body) {
        state
            .requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .push(request);
    }

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<JsonValue>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn client(&self) -> PipelineClient {
        PipelineClient::new(&self.base_url, "token")
    }

    fn last_request(&self) -> JsonValue {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .last()
            .cloned()
            .expect("server must have received a request")
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/v2/pipeline", post(pipeline_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        requests: state.requests,
        task,
    }
}

fn execute_body(result: JsonValue) -> JsonValue {
    json!({
        "results": [
            {
                "type": "ok",
                "response": { "type": "execute", "result": result }
            },
            {
                "type": "ok",
                "response": { "type": "close" }
            }
        ]
    })
}

fn batch_body(step_results: JsonValue, step_errors: JsonValue) -> JsonValue {
    json!({
        "results": [
            {
                "type": "ok",
                "response": {
                    "type": "batch",
                    "result": { "step_results": step_results, "step_errors": step_errors }
                }
            },
            {
                "type": "ok",
                "response": { "type": "close" }
            }
        ]
    })
}

fn affected(count: u64, rowid: &str) -> JsonValue {
    json!({ "cols": [], "rows": [], "affected_row_count": count, "last_insert_rowid": rowid })
}

#[tokio::test]
async fn execute_decodes_columns_rows_and_stats() {
    let server = spawn_server(vec![MockResponse::ok(execute_body(json!({
        "cols": [
            { "name": "id", "decltype": "INTEGER" },
            { "name": "avatar", "decltype": "BLOB" }
        ],
        "rows": [
            [
                { "type": "integer", "value": "1" },
                { "type": "blob", "base64": "AQID" }
            ]
        ],
        "affected_row_count": 0,
        "rows_read": 1,
        "rows_written": 0,
        "query_duration_ms": 0.25
    })))])
    .await;

    let raw = server
        .client()
        .execute(Statement::new(
            "SELECT id, avatar FROM users WHERE id = ?",
            [Value::integer(1)],
        ))
        .await
        .expect("execute must succeed");

    assert_eq!(raw.columns, ["id", "avatar"]);
    assert_eq!(raw.rows[0], [Value::Integer(1), Value::Blob(vec![1, 2, 3])]);
    assert_eq!(raw.stats.rows_read, Some(1));
    assert_eq!(raw.stats.query_duration_ms, Some(0.25));

    let request = server.last_request();
    assert_eq!(request["requests"][0]["type"], "execute");
    assert_eq!(
        request["requests"][0]["stmt"]["args"][0],
        json!({ "type": "integer", "value": "1" })
    );
    assert_eq!(request["requests"][1]["type"], "close");
}

#[tokio::test]
async fn driver_query_resolves_duplicate_columns_and_null_stats() {
    let server = spawn_server(vec![MockResponse::ok(execute_body(json!({
        "cols": [
            { "name": "id", "decltype": "INTEGER" },
            { "name": "name", "decltype": "TEXT" },
            { "name": "id", "decltype": "INTEGER" }
        ],
        "rows": [
            [
                { "type": "integer", "value": "1" },
                { "type": "text", "value": "Kit" },
                { "type": "integer", "value": "10" }
            ]
        ],
        "affected_row_count": 0
    })))])
    .await;
    let driver = SqliteDriver::libsql(server.client(), false);

    let result = driver
        .query(Statement::from(
            "SELECT u.id, u.name, p.id FROM users u JOIN posts p ON p.user_id = u.id",
        ))
        .await
        .expect("query must succeed");

    let names: Vec<_> = result.headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "__id_0"]);
    assert_eq!(result.rows[0]["__id_0"], Value::Integer(10));
    assert_eq!(result.rows[0]["id"], Value::Integer(1));

    let json = serde_json::to_value(&result).expect("must serialize");
    assert!(json["stat"]["rowsRead"].is_null());
    assert!(json["stat"]["queryDurationMs"].is_null());
}

#[tokio::test]
async fn batch_wraps_statements_in_conditional_transaction() {
    let server = spawn_server(vec![MockResponse::ok(batch_body(
        json!([affected(0, "0"), affected(1, "5"), affected(1, "6"), affected(0, "6"), null]),
        json!([null, null, null, null, null]),
    ))])
    .await;
    let driver = SqliteDriver::libsql(server.client(), false);

    let results = driver
        .transaction(vec![
            Statement::new("INSERT INTO users(name) VALUES (?)", [Value::text("A")]),
            Statement::new("INSERT INTO users(name) VALUES (?)", [Value::text("B")]),
        ])
        .await
        .expect("transaction must succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].last_insert_rowid, Some(Value::Integer(5)));
    assert_eq!(results[1].last_insert_rowid, Some(Value::Integer(6)));

    let request = server.last_request();
    let steps = request["requests"][0]["batch"]["steps"]
        .as_array()
        .expect("batch must carry steps")
        .clone();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[0]["stmt"]["sql"], "BEGIN");
    assert!(steps[0].get("condition").is_none());
    assert_eq!(steps[1]["condition"], json!({ "type": "ok", "step": 0 }));
    assert_eq!(steps[2]["condition"], json!({ "type": "ok", "step": 1 }));
    assert_eq!(steps[3]["stmt"]["sql"], "COMMIT");
    assert_eq!(steps[3]["condition"], json!({ "type": "ok", "step": 2 }));
    assert_eq!(steps[4]["stmt"]["sql"], "ROLLBACK");
    assert_eq!(
        steps[4]["condition"],
        json!({ "type": "not", "cond": { "type": "ok", "step": 3 } })
    );
}

#[tokio::test]
async fn failed_commit_is_not_blamed_on_a_statement() {
    let server = spawn_server(vec![MockResponse::ok(batch_body(
        json!([affected(0, "0"), affected(1, "1"), null, affected(0, "1")]),
        json!([
            null,
            null,
            { "message": "database is locked", "code": "SQLITE_BUSY" },
            null
        ]),
    ))])
    .await;

    let err = server
        .client()
        .batch(vec![Statement::new(
            "INSERT INTO users(name) VALUES (?)",
            [Value::text("A")],
        )])
        .await
        .expect_err("batch must fail");

    match err {
        DriverError::Transaction { stage, code, .. } => {
            assert_eq!(stage, "COMMIT");
            assert_eq!(code.as_deref(), Some("SQLITE_BUSY"));
        }
        other => panic!("expected transaction error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_begin_is_reported_as_transaction_error() {
    let server = spawn_server(vec![MockResponse::ok(batch_body(
        json!([null, null, null, null]),
        json!([
            { "message": "cannot start a transaction within a transaction" },
            null,
            null,
            null
        ]),
    ))])
    .await;

    let err = server
        .client()
        .batch(vec![Statement::from("DELETE FROM users")])
        .await
        .expect_err("batch must fail");

    assert!(matches!(err, DriverError::Transaction { stage: "BEGIN", .. }));
}

#[tokio::test]
async fn batch_step_error_names_failing_statement() {
    let server = spawn_server(vec![MockResponse::ok(batch_body(
        json!([affected(0, "0"), affected(1, "1"), null, null, affected(0, "1")]),
        json!([
            null,
            null,
            { "message": "near \"INSER\": syntax error", "code": "SQLITE_ERROR" },
            null,
            null
        ]),
    ))])
    .await;

    let err = server
        .client()
        .batch(vec![
            Statement::new("INSERT INTO users(name) VALUES (?)", [Value::text("A")]),
            Statement::new("INSER INTO users(name) VALUES (?)", [Value::text("B")]),
        ])
        .await
        .expect_err("batch must fail");

    match err {
        DriverError::Pipeline {
            request_index,
            code,
            ..
        } => {
            assert_eq!(request_index, 1);
            assert_eq!(code.as_deref(), Some("SQLITE_ERROR"));
        }
        other => panic!("expected pipeline error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_batch_sends_nothing() {
    let server = spawn_server(Vec::new()).await;
    let results = server
        .client()
        .batch(Vec::new())
        .await
        .expect("empty batch must succeed");
    assert!(results.is_empty());
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retries_on_retryable_http_status() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
        MockResponse::ok(execute_body(affected(2, "7"))),
    ])
    .await;

    let client = server.client().with_options(ClientOptions {
        timeout_ms: 1_000,
        max_retries: 1,
        retry_backoff_ms: 1,
    });

    let raw = client
        .execute(Statement::new(
            "UPDATE users SET name = ?",
            [Value::text("Renamed")],
        ))
        .await
        .expect("request must succeed after retry");

    assert_eq!(raw.stats.rows_affected, 2);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_retryable_status_surfaces_http_error() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::UNAUTHORIZED,
        json!({"error": "bad token"}),
    )])
    .await;
    let client = server.client().with_options(ClientOptions {
        max_retries: 3,
        ..ClientOptions::default()
    });

    let err = client
        .execute(Statement::from("SELECT 1"))
        .await
        .expect_err("request must fail");

    assert!(matches!(err, DriverError::Http { status: 401, .. }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![
        MockResponse::ok(execute_body(affected(1, "1"))).with_delay(Duration::from_millis(150)),
    ])
    .await;

    let client = server.client().with_options(ClientOptions {
        timeout_ms: 20,
        max_retries: 0,
        retry_backoff_ms: 1,
    });

    let err = client
        .execute(Statement::from("DELETE FROM users"))
        .await
        .expect_err("request must timeout");

    match err {
        DriverError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn execute_sql_error_is_top_level_error() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "results": [
            {
                "type": "error",
                "error": { "message": "no such table: users", "code": "SQLITE_ERROR" }
            },
            {
                "type": "ok",
                "response": { "type": "close" }
            }
        ]
    }))])
    .await;

    let err = server
        .client()
        .execute(Statement::from("SELECT * FROM users"))
        .await
        .expect_err("execute must fail");

    match err {
        DriverError::Pipeline {
            request_index,
            message,
            ..
        } => {
            assert_eq!(request_index, 0);
            assert_eq!(message, "no such table: users");
        }
        other => panic!("expected pipeline error, got {other:?}"),
    }
}
