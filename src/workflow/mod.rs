pub mod leave;
pub mod task;

use thiserror::Error;

/// The caller of a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub is_super_user: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Only assignees of this task can request completion")]
    NotAssignee,
    #[error("Only the task creator can review completion requests")]
    NotReviewer,
    #[error("Only the task creator can change this task")]
    NotCreator,
    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },
    #[error("No pending completion request to review")]
    NothingToReview,
    #[error("User {0} is not assigned to this task")]
    UnknownAssignee(u64),
    #[error("start_date cannot be after end_date")]
    InvalidDateRange,
}

impl WorkflowError {
    pub(crate) fn transition(from: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        WorkflowError::InvalidTransition {
            from: from.as_ref().to_string(),
            to: to.as_ref().to_string(),
        }
    }
}
