use thiserror::Error;

/// Failure taxonomy for the core. Only `InputInvalid` and `RateLimited` ever
/// propagate to the transport; every other kind is absorbed into a
/// degraded-but-successful turn.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        reset_epoch: i64,
    },

    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("model output failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("safety review rejected: {0}")]
    SafetyReject(String),

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the transport is allowed to see this error as an error.
    /// Everything else must have been converted into a degraded reply
    /// before reaching the boundary.
    pub fn propagates(&self) -> bool {
        matches!(self, CoreError::InputInvalid(_) | CoreError::RateLimited { .. })
    }
}
