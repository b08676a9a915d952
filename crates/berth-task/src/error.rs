use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("stale allocation: {0}")]
    StaleAllocation(String),
    #[error("cannot start a new task session: {0}")]
    SessionCreateFailure(String),
    #[error("unexpected operation: {0}")]
    UnexpectedOperation(String),
    #[error("container failure: {0}")]
    ContainerFailure(String),
    #[error("cleanup failure: {0}")]
    CleanupFailure(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("the task controller has stopped")]
    ControllerStopped,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TaskError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TaskError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TaskError::InternalError(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        TaskError::UnexpectedOperation(message.into())
    }
}

impl<T> From<mpsc::error::SendError<T>> for TaskError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        TaskError::ControllerStopped
    }
}

impl From<oneshot::error::RecvError> for TaskError {
    fn from(_: oneshot::error::RecvError) -> Self {
        TaskError::ControllerStopped
    }
}

impl From<regex::Error> for TaskError {
    fn from(error: regex::Error) -> Self {
        TaskError::InvalidArgument(error.to_string())
    }
}
