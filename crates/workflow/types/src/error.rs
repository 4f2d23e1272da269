use crate::{Action, OrderState};
use thiserror::Error;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Workflow-layer errors.
///
/// `NotFound`, `InvalidTransition` and `InvalidRequest` are client errors
/// and are never retried automatically. `Conflict` and `StoreUnavailable`
/// are safe for the caller to retry; the engine itself does not auto-retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("action {action} is not valid in state {state}")]
    InvalidTransition { state: OrderState, action: Action },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl WorkflowError {
    /// Whether the caller may safely retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::StoreUnavailable(_))
    }
}
