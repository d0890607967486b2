//! # Deckshell Session Multiplexer
//!
//! This crate owns the interactive terminal sessions of a shell UI: it keeps
//! the registry of live sessions, tracks which one has input focus, and routes
//! keystrokes and output between presentation handles and a process backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                  RouterService (single task)                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │   UI commands ──┐                         ┌── BackendEvent    │
//! │   local input ──┼──►   SessionRouter   ◄──┘   (Output,        │
//! │                 │      │          │            Destroyed)     │
//! │                 │      ▼          ▼                           │
//! │        ┌─────────────────┐  ┌──────────────────────┐          │
//! │        │ SessionRegistry │  │ ActiveSessionTracker │          │
//! │        └─────────────────┘  └──────────────────────┘          │
//! │                 │                                             │
//! │                 ▼                                             │
//! │        SessionView (one per session)     SessionBackend       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All registry and tracker mutations happen inside [`RouterService`], so
//! neither needs internal locking. Closing a session is a request written to
//! the shell; the session is only torn down when the backend reports that its
//! process is gone.
//!
//! ## Modules
//!
//! - [`id`]: session identifiers
//! - [`backend`]: the process backend contract and its event stream
//! - [`view`]: presentation handles and per-session context
//! - [`registry`]: the ordered set of live sessions
//! - [`tracker`]: the focused-session state and focus notifications
//! - [`neighbor`]: circular-successor selection after a destroy
//! - [`router`]: the session lifecycle state machine
//! - [`service`]: the actor that serializes access to the router

pub mod backend;
pub mod error;
pub mod id;
pub mod neighbor;
pub mod registry;
pub mod router;
pub mod service;
pub mod tracker;
pub mod view;

pub use backend::{BackendError, BackendEvent, SessionBackend};
pub use error::{RouterError, RouterResult};
pub use id::SessionId;
pub use neighbor::circular_successor;
pub use registry::{Session, SessionRegistry, SessionState};
pub use router::{RouterConfig, SessionInfo, SessionRouter, DEFAULT_CLOSE_SEQUENCE};
pub use service::{RouterHandle, RouterService};
pub use tracker::{ActiveSessionTracker, FocusChange};
pub use view::{Dimensions, LocalInput, SessionContext, SessionView, ViewFactory};
