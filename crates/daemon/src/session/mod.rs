//! Session process management.
//!
//! This module provides the PTY-backed implementation of the multiplexer's
//! session backend.

pub mod pty;

pub use pty::{PtyBackend, ShellOptions};
