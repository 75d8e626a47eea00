//! Typed errors surfaced by the engine to the runner.

/// Conditions that stop a tenant's workload. Failures below the retry budget
/// never become a `BloaterError`; they are absorbed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BloaterError {
    /// A workload stage asked for zero requests per second, or for more than
    /// one per nanosecond.
    #[error("stage {stage}: requests per second must be between 1 and 1000000000")]
    InvalidRate { stage: usize },

    /// The target answered with a status the engine has no model for.
    #[error("tenant {tenant}: unmodeled response status {status} for request {request_id}")]
    UnmodeledStatus {
        tenant: u32,
        request_id: String,
        status: u16,
    },

    /// Configuration rejected before any request was sent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BloaterError {
    /// True for conditions raised while traffic was flowing (as opposed to
    /// configuration problems caught at stage start).
    pub fn is_runtime(&self) -> bool {
        matches!(self, BloaterError::UnmodeledStatus { .. })
    }
}
