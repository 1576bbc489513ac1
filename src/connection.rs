use async_trait::async_trait;

use crate::{RawResult, Result, Statement};

/// Backend client a driver talks through.
///
/// Implementations only move statements and raw results; interpretation is
/// left to the driver. Cancelling a call is the implementation's concern and
/// surfaces as an ordinary error.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Connection: Send + Sync {
    /// Executes one statement.
    async fn execute(&self, statement: Statement) -> Result<RawResult>;

    /// Executes `statements` atomically: either every statement applies or
    /// none does, and the first failure is returned.
    async fn batch(&self, statements: Vec<Statement>) -> Result<Vec<RawResult>>;
}
