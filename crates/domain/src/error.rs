use crate::policy::PolicyKey;

/// Failure raised by a policy, usage, or override backend.
///
/// Timeouts are reported here too: a store call that does not finish within
/// its bound is indistinguishable from an unreachable backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timeout: {op} did not complete within {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused a write because the resulting record would be
    /// invalid.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Backend(String),
}

/// Shared error type used across all QuotaGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("policy not found: {0}")]
    PolicyNotFound(PolicyKey),

    #[error("policy already exists: {0}")]
    PolicyAlreadyExists(PolicyKey),

    #[error("validation: {0}")]
    Validation(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
