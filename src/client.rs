use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};

// tokio::time::sleep is only available on non-WASM targets.
#[cfg(not(target_arch = "wasm32"))]
use tokio::time::sleep;

use crate::{
    connection::Connection,
    decode::{build_execute_statement, decode_raw_result},
    wire::{self, Batch, BatchCond, BatchStep, ExecuteStatement, PipelineRequest, Request},
    ClientOptions, DriverError, RawResult, Result, Statement,
};

/// Normalizes a database URL into its pipeline endpoint.
///
/// Example: `"libsql://db.example.io"` → `"https://db.example.io/v2/pipeline"`
pub fn to_pipeline_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v2/pipeline") {
        return trimmed.to_owned();
    }
    if let Some(host) = trimmed.strip_prefix("libsql://") {
        return format!("https://{host}/v2/pipeline");
    }
    format!("{trimmed}/v2/pipeline")
}

#[derive(Clone)]
/// HTTP client for the libSQL pipeline endpoint of a remote SQLite store.
pub struct PipelineClient {
    http: reqwest::Client,
    pipeline_url: String,
    token: String,
    options: ClientOptions,
}

impl fmt::Debug for PipelineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineClient")
            .field("pipeline_url", &self.pipeline_url)
            .field("token", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl PipelineClient {
    /// Creates a client with a full raw authorization value.
    ///
    /// `pipeline_url` is used as given.
    pub fn new_raw_auth(pipeline_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            pipeline_url: pipeline_url.into(),
            token: authorization.into(),
            options: ClientOptions::default(),
        }
    }

    /// Creates a client from a database URL and a bearer token.
    ///
    /// `libsql://` URLs are rewritten to `https://`, the pipeline path is
    /// appended when missing, and the `Bearer ` prefix is added when missing.
    pub fn new(url: impl AsRef<str>, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        Self::new_raw_auth(to_pipeline_url(url.as_ref()), authorization)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `LIBSQL_URL`: database URL (`libsql://`, `https://` or a full
    ///   pipeline URL)
    /// - `LIBSQL_AUTH_TOKEN`: access token (Bearer prefix optional)
    ///
    /// Returns an error if either variable is missing or empty.
    ///
    /// Not available on `wasm32` targets.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("LIBSQL_URL")
            .map_err(|_| "missing LIBSQL_URL environment variable".to_owned())?;
        let token = std::env::var("LIBSQL_AUTH_TOKEN")
            .map_err(|_| "missing LIBSQL_AUTH_TOKEN environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("LIBSQL_URL is set but empty".to_owned());
        }
        if token.trim().is_empty() {
            return Err("LIBSQL_AUTH_TOKEN is set but empty".to_owned());
        }
        Ok(Self::new(url, token))
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn pipeline_url(&self) -> &str {
        &self.pipeline_url
    }

    async fn run_single(&self, stmt: ExecuteStatement) -> Result<wire::ExecuteResult> {
        let payload = PipelineRequest {
            requests: vec![Request::Execute { stmt }, Request::Close {}],
        };
        let [execute, close] = self.send_expecting::<2>(&payload).await?;

        let execute_result = Self::into_response(execute, "execute", 0)?;
        Self::ensure_close_success(close, 1)?;
        parse_result(execute_result, 0)
    }

    /// Runs `stmts` inside `BEGIN`/`COMMIT` as one conditional batch.
    ///
    /// Each step only runs if the previous one succeeded; `ROLLBACK` runs
    /// when `COMMIT` did not.
    async fn run_transaction(&self, stmts: Vec<ExecuteStatement>) -> Result<Vec<wire::ExecuteResult>> {
        let count = stmts.len();
        let mut steps = Vec::with_capacity(count + 3);
        steps.push(BatchStep {
            condition: None,
            stmt: control_statement("BEGIN"),
        });
        for (index, stmt) in stmts.into_iter().enumerate() {
            steps.push(BatchStep {
                condition: Some(BatchCond::Ok { step: index }),
                stmt,
            });
        }
        let commit_step = count + 1;
        steps.push(BatchStep {
            condition: Some(BatchCond::Ok { step: count }),
            stmt: control_statement("COMMIT"),
        });
        steps.push(BatchStep {
            condition: Some(BatchCond::Not {
                cond: Box::new(BatchCond::Ok { step: commit_step }),
            }),
            stmt: control_statement("ROLLBACK"),
        });

        let payload = PipelineRequest {
            requests: vec![Request::Batch { batch: Batch { steps } }, Request::Close {}],
        };
        let [batch, close] = self.send_expecting::<2>(&payload).await?;
        let batch_result = Self::into_response(batch, "batch", 0)?;
        Self::ensure_close_success(close, 1)?;

        let batch: wire::BatchResult = serde_json::from_value(batch_result)
            .map_err(|err| DriverError::Decode(format!("invalid batch result: {err}")))?;

        // Step 0 is BEGIN, so statement `i` is step `i + 1`.
        for (step, error) in batch.step_errors.into_iter().enumerate() {
            let Some(error) = error else {
                continue;
            };
            let stage = match step {
                0 => "BEGIN",
                step if step <= count => {
                    return Err(DriverError::Pipeline {
                        request_index: step - 1,
                        message: error.message,
                        code: error.code,
                    })
                }
                step if step == commit_step => "COMMIT",
                _ => "ROLLBACK",
            };
            return Err(DriverError::Transaction {
                stage,
                message: error.message,
                code: error.code,
            });
        }

        let mut step_results = batch.step_results.into_iter().skip(1);
        (0..count)
            .map(|index| {
                step_results.next().flatten().ok_or_else(|| {
                    DriverError::Decode(format!("missing batch result for statement {index}"))
                })
            })
            .collect()
    }

    async fn send_expecting<const N: usize>(
        &self,
        payload: &PipelineRequest,
    ) -> Result<[wire::PipelineResult; N]> {
        let response = self.send_pipeline_with_retry(payload).await?;
        let got = response.results.len();
        <[wire::PipelineResult; N]>::try_from(response.results).map_err(|_| {
            DriverError::Decode(format!("result count mismatch: expected {N}, got {got}"))
        })
    }

    async fn send_pipeline_with_retry(
        &self,
        payload: &PipelineRequest,
    ) -> Result<wire::PipelineResponse> {
        let mut attempt = 0usize;
        loop {
            // Build the request. On WASM, reqwest uses AbortController for
            // timeout; the `.timeout()` method is available on both targets.
            let response = self
                .http
                .post(&self.pipeline_url)
                .header(header::AUTHORIZATION, &self.token)
                .header(header::CONTENT_TYPE, "application/json")
                .timeout(Duration::from_millis(self.options.timeout_ms))
                .json(payload)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(DriverError::Transport)?;

                    if !status.is_success() {
                        if self.should_retry_status(status) && attempt < self.options.max_retries {
                            self.wait_before_retry(attempt).await;
                            attempt += 1;
                            continue;
                        }

                        return Err(DriverError::Http {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    return serde_json::from_str::<wire::PipelineResponse>(&body).map_err(|err| {
                        DriverError::Decode(format!(
                            "invalid pipeline response JSON: {err}; body: {body}"
                        ))
                    });
                }
                Err(err) => {
                    if self.should_retry_transport(&err) && attempt < self.options.max_retries {
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DriverError::Transport(err));
                }
            }
        }
    }

    fn into_response(
        result: wire::PipelineResult,
        expected: &str,
        request_index: usize,
    ) -> Result<serde_json::Value> {
        match result.kind.as_str() {
            "ok" => {
                let response = result.response.ok_or_else(|| {
                    DriverError::Decode(format!(
                        "missing response payload for request {request_index}"
                    ))
                })?;
                if response.kind != expected {
                    return Err(DriverError::Decode(format!(
                        "expected {expected} response at request {request_index}, got '{}'",
                        response.kind
                    )));
                }
                response.result.ok_or_else(|| {
                    DriverError::Decode(format!(
                        "missing {expected} result payload at request {request_index}"
                    ))
                })
            }
            "error" => Err(Self::pipeline_error(result, request_index)),
            other => Err(DriverError::Decode(format!(
                "unknown pipeline result type '{other}' at request {request_index}"
            ))),
        }
    }

    fn ensure_close_success(result: wire::PipelineResult, request_index: usize) -> Result<()> {
        match result.kind.as_str() {
            "ok" => {
                let response = result.response.ok_or_else(|| {
                    DriverError::Decode(format!(
                        "missing close response payload for request {request_index}"
                    ))
                })?;
                if response.kind != "close" {
                    return Err(DriverError::Decode(format!(
                        "expected close response at request {request_index}, got '{}'",
                        response.kind
                    )));
                }
                Ok(())
            }
            "error" => Err(Self::pipeline_error(result, request_index)),
            other => Err(DriverError::Decode(format!(
                "unknown pipeline result type '{other}' at request {request_index}"
            ))),
        }
    }

    fn pipeline_error(result: wire::PipelineResult, request_index: usize) -> DriverError {
        match result.error {
            Some(error) => DriverError::Pipeline {
                request_index,
                message: error.message,
                code: error.code,
            },
            None => DriverError::Decode(format!(
                "missing error payload for request {request_index}"
            )),
        }
    }

    fn should_retry_status(&self, status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    }

    fn should_retry_transport(&self, err: &reqwest::Error) -> bool {
        err.is_timeout()
            || err.is_request()
            || err.is_body()
            // is_connect() is not available on wasm32 targets (no TCP)
            || {
                #[cfg(not(target_arch = "wasm32"))]
                { err.is_connect() }
                #[cfg(target_arch = "wasm32")]
                { false }
            }
    }

    /// Waits before the next retry attempt.
    ///
    /// On native targets: exponential backoff sleep via `tokio::time::sleep`.
    /// On WASM targets: no-op, edge runtimes prefer fast failure.
    async fn wait_before_retry(&self, attempt: usize) {
        let delay_ms = self.options.backoff_delay_ms(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying pipeline request after {} ms", delay_ms);

        #[cfg(not(target_arch = "wasm32"))]
        sleep(Duration::from_millis(delay_ms)).await;

        // no timer on wasm32
        #[cfg(target_arch = "wasm32")]
        let _ = delay_ms;
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Connection for PipelineClient {
    async fn execute(&self, statement: Statement) -> Result<RawResult> {
        let stmt = build_execute_statement(statement, true)?;
        decode_raw_result(self.run_single(stmt).await?)
    }

    async fn batch(&self, statements: Vec<Statement>) -> Result<Vec<RawResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let stmts = statements
            .into_iter()
            .map(|statement| build_execute_statement(statement, true))
            .collect::<Result<Vec<_>>>()?;
        self.run_transaction(stmts)
            .await?
            .into_iter()
            .map(decode_raw_result)
            .collect()
    }
}

fn control_statement(sql: &str) -> ExecuteStatement {
    ExecuteStatement {
        sql: sql.to_owned(),
        args: None,
        named_args: None,
        want_rows: false,
    }
}

fn parse_result(value: serde_json::Value, request_index: usize) -> Result<wire::ExecuteResult> {
    serde_json::from_value(value).map_err(|err| {
        DriverError::Decode(format!(
            "invalid execute result at request {request_index}: {err}"
        ))
    })
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
