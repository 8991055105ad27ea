use crate::executor::{ActionKind, ExecutorError};

/// Typed failures crossing the [`Controller`](crate::control::Controller)
/// boundary. All of these are recoverable from the UI's point of view: the
/// operation is reported and the user may retry.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid duration: {0}")]
    InvalidFormat(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedAction(ActionKind),

    #[error("power command failed: {0}")]
    Executor(#[from] ExecutorError),

    #[error("invalid operation: {0}")]
    InvalidState(&'static str),

    #[error("no watch targets configured")]
    EmptySet,
}
