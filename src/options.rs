/// Configures HTTP timeout and retry behavior of [`crate::PipelineClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
}

impl ClientOptions {
    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn backoff_delay_ms(&self, attempt: usize) -> u64 {
        let exp = attempt.min(16) as u32;
        self.retry_backoff_ms.saturating_mul(1u64 << exp)
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 0,
            retry_backoff_ms: 250,
        }
    }
}
