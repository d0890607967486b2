//! The process backend contract.
//!
//! The router never touches processes or pseudo-terminals itself. It drives a
//! [`SessionBackend`] through four operations and consumes the backend's
//! [`BackendEvent`] stream.

use std::future::Future;

use thiserror::Error;

use crate::id::SessionId;
use crate::view::Dimensions;

/// Errors reported by a session backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend has no process for this session.
    #[error("no backend process for session: {0}")]
    NotFound(SessionId),

    /// Failed to create the process or its PTY.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// Failed to kill the process.
    #[error("failed to terminate session: {0}")]
    TerminateFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events emitted asynchronously by a backend.
///
/// For a given session, every `Output` is emitted before its `Destroyed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The session's process produced output.
    Output { id: SessionId, data: Vec<u8> },
    /// The session's process is gone. No further events follow for `id`.
    Destroyed {
        id: SessionId,
        exit_code: Option<u32>,
    },
}

impl BackendEvent {
    /// Returns the session this event belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            BackendEvent::Output { id, .. } | BackendEvent::Destroyed { id, .. } => id,
        }
    }
}

/// Trait for the process/PTY manager behind the router.
///
/// `write`, `resize` and `terminate` are fire-and-forget: implementations
/// must not block on the process, and their errors are treated as
/// best-effort by the router.
pub trait SessionBackend: Send + Sync {
    /// Spawns a shell attached to a new pseudo-terminal for `id`.
    fn spawn(&self, id: &SessionId) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Queues `data` as input for the session's process.
    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), BackendError>;

    /// Resizes the session's terminal.
    fn resize(&self, id: &SessionId, size: Dimensions) -> Result<(), BackendError>;

    /// Kills the session's process outright.
    ///
    /// The backend still reports the exit through a `Destroyed` event.
    fn terminate(&self, id: &SessionId) -> Result<(), BackendError>;
}
