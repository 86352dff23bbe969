//! Structured error types for the three domains worth distinguishing at a
//! glance in logs (§7): LLM provider calls, the accessibility back-end, and
//! queue persistence. Everything else stays on `anyhow::Result` and
//! propagates through these via `?` since each variant implements
//! `std::error::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("LLM API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("LLM response did not parse as expected: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum AxError {
    #[error("accessibility back-end timed out after {0}ms")]
    Timeout(u64),

    #[error("accessibility back-end process failed: {0}")]
    SpawnFailed(String),

    #[error("accessibility back-end returned malformed output: {0}")]
    MalformedOutput(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to persist queue file {path}: {source}")]
    PersistFailed { path: String, source: std::io::Error },
}

/// Top-level error distinguishing the domains above. `ToolExecution` failures
/// are never constructed as an `Err` — they're always converted into a
/// `ToolResult` and returned to the model instead (§7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Accessibility(#[from] AxError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
