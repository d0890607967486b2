//! Error types for the session router.

use thiserror::Error;

use crate::backend::BackendError;
use crate::id::SessionId;

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors surfaced by the session router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A freshly minted id collided with a live session.
    ///
    /// Indicates an id-minting bug. Fatal to the create call that hit it,
    /// never to the router.
    #[error("duplicate session id: {0}")]
    DuplicateId(SessionId),

    /// The operation addressed a session that does not exist (any more).
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The backend could not start a process for a new session.
    #[error("backend failed to spawn session: {0}")]
    BackendSpawnFailed(#[source] BackendError),

    /// The configured session limit has been reached.
    #[error("session limit reached: {0} sessions")]
    SessionLimit(usize),

    /// The router service is no longer running.
    #[error("router service stopped")]
    ServiceStopped,
}

impl RouterError {
    /// Returns true if the caller should refresh its view of the session
    /// list rather than report a failure.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, RouterError::NotFound(_))
    }
}
