//! Presentation handles.
//!
//! A [`SessionView`] is the capability a session uses to render its output
//! and receive focus. Each session owns exactly one, created by a
//! [`ViewFactory`] when the session is created and disposed when the session
//! is removed.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::id::SessionId;

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub rows: u16,
    pub cols: u16,
}

impl Dimensions {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Keystrokes typed into a session's view, on their way to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInput {
    pub id: SessionId,
    pub data: Vec<u8>,
}

/// Immutable per-session context handed to a view on attach.
///
/// The context carries the session id explicitly, so a view never has to
/// capture it from elsewhere.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: SessionId,
    input: mpsc::UnboundedSender<LocalInput>,
}

impl SessionContext {
    pub fn new(id: SessionId, input: mpsc::UnboundedSender<LocalInput>) -> Self {
        Self { id, input }
    }

    /// Returns the id of the session this context belongs to.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Forwards input typed by the user to the session's process.
    ///
    /// Returns false if the router is gone.
    pub fn write_local_input(&self, data: impl Into<Vec<u8>>) -> bool {
        self.input
            .send(LocalInput {
                id: self.id.clone(),
                data: data.into(),
            })
            .is_ok()
    }
}

/// A presentation handle for one session.
pub trait SessionView: Send {
    /// Binds the view to its rendering surface.
    fn attach(&mut self, context: SessionContext);

    /// Renders a chunk of the session's output.
    fn render(&mut self, data: &[u8]);

    /// Gives the view input focus.
    fn focus(&mut self);

    /// Removes input focus from the view.
    fn blur(&mut self);

    /// Proposes terminal dimensions for the current viewport, if known.
    fn propose_dimensions(&self) -> Option<Dimensions> {
        None
    }

    /// Releases all resources. Called exactly once, when the session is gone.
    fn dispose(&mut self);
}

/// Allocates a presentation handle for each new session.
pub trait ViewFactory: Send {
    type View: SessionView;

    fn create_view(&mut self, id: &SessionId) -> Self::View;
}
