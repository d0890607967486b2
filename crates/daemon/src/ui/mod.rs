//! Console front end.
//!
//! Session views that render to the host terminal and the line-oriented
//! command language used to drive them.

pub mod commands;
pub mod console;

pub use commands::{parse_line, resolve_tab, CommandError, ConsoleCommand, ConsoleLine, HELP};
pub use console::{sink, ConsoleView, ConsoleViewFactory, Keyboard, Sink, Viewport};
