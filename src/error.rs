/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// SQL error returned by the backend for one statement.
    #[error("pipeline error at request {request_index}: {message}")]
    Pipeline {
        /// Index of the failing statement.
        request_index: usize,
        /// Error message text from the backend.
        message: String,
        /// Optional engine-specific error code.
        code: Option<String>,
    },
    /// A batch's `BEGIN`, `COMMIT` or `ROLLBACK` failed rather than one of
    /// its statements.
    #[error("transaction {stage} failed: {message}")]
    Transaction {
        stage: &'static str,
        message: String,
        code: Option<String>,
    },
    /// Response decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
    /// A catalog query failed; introspection was aborted.
    #[error("catalog query '{catalog}' failed: {source}")]
    CatalogQuery {
        /// Which catalog query failed (`tables`, `columns`, ...).
        catalog: &'static str,
        #[source]
        source: Box<DriverError>,
    },
    /// The requested change needs a capability the active backend lacks.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Membership rows of one foreign key point at different tables.
    #[error(
        "foreign key {schema}.{table}.{constraint} references both '{first}' and '{second}'"
    )]
    AmbiguousForeignKey {
        schema: String,
        table: String,
        constraint: String,
        first: String,
        second: String,
    },
    /// A raw result violates the expected header/row shape.
    #[error("transform error: {0}")]
    Transform(String),
    /// A change request is ill-formed against the current table.
    #[error("invalid change: {0}")]
    InvalidChange(String),
}

impl DriverError {
    pub(crate) fn catalog(catalog: &'static str, source: DriverError) -> Self {
        Self::CatalogQuery {
            catalog,
            source: Box::new(source),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }
}
