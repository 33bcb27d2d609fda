//! Error types.
//!
//! Domain failures are statuses (`Status::Failed(code)`), not errors. The
//! types here cover the two places where the runtime reports to its caller
//! instead: event handlers rejecting an event, and subtree loading.

use thiserror::Error;

use crate::TaskId;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {task} rejected event: {reason}")]
    EventRejected { task: TaskId, reason: String },

    #[error("event handler failed")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl TaskError {
    pub fn rejected(task: TaskId, reason: impl Into<String>) -> Self {
        Self::EventRejected {
            task,
            reason: reason.into(),
        }
    }

    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Handler(Box::new(err))
    }
}

/// Failure to produce a subtree from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("subtree `{0}` not found")]
    NotFound(String),

    #[error("leaf `{0}` is not registered")]
    UnknownLeaf(String),

    #[error("invalid definition for `{name}`: {reason}")]
    InvalidDefinition { name: String, reason: String },
}
