//! # Deckshell host library
//!
//! This crate hosts the session multiplexer in a terminal: it spawns shells
//! on pseudo-terminals, renders the focused session to the console and
//! routes console input back to it.
//!
//! ## Architecture
//!
//! ```text
//! stdin ──► ShellOrchestrator ──commands──► RouterHandle ──► RouterService
//!               │    ▲                                          │     ▲
//!               │    └──────── focus changes ◄──────────────────┤     │ events
//!               ▼                                               ▼     │
//!            Keyboard ◄── ConsoleView (one per session) ◄── SessionRouter
//!                               │                               │
//!                               ▼                               ▼
//!                             stdout                       PtyBackend
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: tracing subscriber setup
//! - [`session`]: the portable-pty session backend
//! - [`ui`]: console views and command parsing
//! - [`orchestrator`]: the host run loop

pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod ui;

pub use config::{Config, ConfigError};
pub use orchestrator::{ExitReason, ShellOrchestrator};
pub use session::{PtyBackend, ShellOptions};
pub use ui::{ConsoleView, ConsoleViewFactory, Keyboard, Viewport};
