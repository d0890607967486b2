//! Console presentation for sessions.
//!
//! Every session gets a [`ConsoleView`] that shares the host's output sink.
//! Only the focused view writes to the sink; a blurred view keeps a bounded
//! scrollback that is replayed when it regains focus. The focused view also
//! owns the [`Keyboard`], so lines typed at the console reach its session.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use multiplexer::{Dimensions, SessionContext, SessionId, SessionView, ViewFactory};

/// Output sink shared by all views.
pub type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wraps a writer into a [`Sink`].
pub fn sink<W: Write + Send + 'static>(writer: W) -> Sink {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Where views take their proposed terminal size from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewport {
    /// The controlling terminal, as reported by crossterm.
    Terminal,
    /// A fixed size, for non-interactive hosts.
    Fixed(Dimensions),
}

impl Viewport {
    /// Returns the current size, if one can be determined.
    pub fn dimensions(&self) -> Option<Dimensions> {
        match self {
            Viewport::Terminal => crossterm::terminal::size()
                .ok()
                .filter(|&(cols, rows)| cols > 0 && rows > 0)
                .map(|(cols, rows)| Dimensions::new(rows, cols)),
            Viewport::Fixed(size) => Some(*size),
        }
    }
}

/// Routes console keystrokes to the session whose view holds focus.
#[derive(Debug, Clone, Default)]
pub struct Keyboard {
    owner: Arc<Mutex<Option<SessionContext>>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `data` to the focused session.
    ///
    /// Returns false when no view holds focus or the router is gone.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        match self.owner.lock() {
            Ok(owner) => owner
                .as_ref()
                .is_some_and(|context| context.write_local_input(data)),
            Err(_) => false,
        }
    }

    /// Returns the session currently receiving keystrokes.
    pub fn owner(&self) -> Option<SessionId> {
        self.owner
            .lock()
            .ok()
            .and_then(|owner| owner.as_ref().map(|context| context.id().clone()))
    }

    fn grab(&self, context: &SessionContext) {
        if let Ok(mut owner) = self.owner.lock() {
            *owner = Some(context.clone());
        }
    }

    fn release(&self, id: &SessionId) {
        if let Ok(mut owner) = self.owner.lock() {
            if owner.as_ref().is_some_and(|context| context.id() == id) {
                *owner = None;
            }
        }
    }
}

/// A session's console view.
pub struct ConsoleView {
    id: SessionId,
    sink: Sink,
    keyboard: Keyboard,
    viewport: Viewport,
    context: Option<SessionContext>,
    focused: bool,
    scrollback: VecDeque<u8>,
    scrollback_limit: usize,
}

impl ConsoleView {
    /// Returns whether this view currently has focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Returns the number of buffered background bytes.
    pub fn buffered(&self) -> usize {
        self.scrollback.len()
    }

    fn write_sink(&self, data: &[u8]) {
        let result = match self.sink.lock() {
            Ok(mut sink) => sink.write_all(data).and_then(|_| sink.flush()),
            Err(_) => return,
        };
        if let Err(e) = result {
            tracing::warn!(session_id = %self.id, error = %e, "Failed to write session output");
        }
    }

    fn buffer(&mut self, data: &[u8]) {
        if self.scrollback_limit == 0 {
            return;
        }

        // Keep only the newest bytes
        let data = &data[data.len().saturating_sub(self.scrollback_limit)..];
        let overflow = (self.scrollback.len() + data.len()).saturating_sub(self.scrollback_limit);
        self.scrollback.drain(..overflow);
        self.scrollback.extend(data);
    }
}

impl SessionView for ConsoleView {
    fn attach(&mut self, context: SessionContext) {
        self.context = Some(context);
    }

    fn render(&mut self, data: &[u8]) {
        if self.focused {
            self.write_sink(data);
        } else {
            self.buffer(data);
        }
    }

    fn focus(&mut self) {
        self.focused = true;
        if let Some(context) = &self.context {
            self.keyboard.grab(context);
        }

        if !self.scrollback.is_empty() {
            let pending: Vec<u8> = self.scrollback.drain(..).collect();
            self.write_sink(&pending);
        }
    }

    fn blur(&mut self) {
        self.focused = false;
        self.keyboard.release(&self.id);
    }

    fn propose_dimensions(&self) -> Option<Dimensions> {
        self.viewport.dimensions()
    }

    fn dispose(&mut self) {
        self.focused = false;
        self.keyboard.release(&self.id);
        self.context = None;
        self.scrollback = VecDeque::new();
        tracing::trace!(session_id = %self.id, "Console view disposed");
    }
}

/// Creates [`ConsoleView`]s sharing one sink and keyboard.
pub struct ConsoleViewFactory {
    sink: Sink,
    keyboard: Keyboard,
    viewport: Viewport,
    scrollback_limit: usize,
}

impl ConsoleViewFactory {
    pub fn new(sink: Sink, keyboard: Keyboard, viewport: Viewport, scrollback_limit: usize) -> Self {
        Self {
            sink,
            keyboard,
            viewport,
            scrollback_limit,
        }
    }
}

impl ViewFactory for ConsoleViewFactory {
    type View = ConsoleView;

    fn create_view(&mut self, id: &SessionId) -> ConsoleView {
        ConsoleView {
            id: id.clone(),
            sink: Arc::clone(&self.sink),
            keyboard: self.keyboard.clone(),
            viewport: self.viewport,
            context: None,
            focused: false,
            scrollback: VecDeque::new(),
            scrollback_limit: self.scrollback_limit,
        }
    }
}
