//! Console command parsing.
//!
//! A console line starting with the command prefix (`:` by default) is a
//! host command; anything else is input for the active session. Doubling
//! the prefix sends the line to the shell with one prefix stripped.

use multiplexer::SessionId;
use thiserror::Error;

/// Help text listing the console commands.
pub const HELP: &str = "\
commands:
  new          open a new session
  switch N     focus session N
  close [N]    ask session N (default: active) to exit
  kill [N]     kill session N (default: active)
  list         list sessions
  help         show this help
  quit         close every session and exit";

/// Errors from parsing a console command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0} (try help)")]
    Unknown(String),

    #[error("{0} needs a session number")]
    MissingTab(&'static str),

    #[error("invalid session number: {0}")]
    InvalidTab(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

/// A host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    New,
    Switch(usize),
    Close(Option<usize>),
    Kill(Option<usize>),
    List,
    Help,
    Quit,
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// A host command.
    Command(ConsoleCommand),
    /// Input for the active session.
    Input(String),
}

/// Parses one console line, without its trailing newline.
pub fn parse_line(line: &str, prefix: &str) -> Result<ConsoleLine, CommandError> {
    let Some(rest) = line.strip_prefix(prefix) else {
        return Ok(ConsoleLine::Input(line.to_string()));
    };
    if rest.starts_with(prefix) {
        return Ok(ConsoleLine::Input(rest.to_string()));
    }

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    if let Some(extra) = words.next() {
        return Err(CommandError::UnexpectedArgument(extra.to_string()));
    }

    let command = match name {
        "new" | "n" => no_arg(ConsoleCommand::New, arg)?,
        "switch" | "s" => {
            let tab = arg.ok_or(CommandError::MissingTab("switch"))?;
            ConsoleCommand::Switch(parse_tab(tab)?)
        }
        "close" | "c" => ConsoleCommand::Close(arg.map(parse_tab).transpose()?),
        "kill" | "k" => ConsoleCommand::Kill(arg.map(parse_tab).transpose()?),
        "list" | "ls" => no_arg(ConsoleCommand::List, arg)?,
        "help" | "h" | "?" => no_arg(ConsoleCommand::Help, arg)?,
        "quit" | "q" => no_arg(ConsoleCommand::Quit, arg)?,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(ConsoleLine::Command(command))
}

fn no_arg(command: ConsoleCommand, arg: Option<&str>) -> Result<ConsoleCommand, CommandError> {
    match arg {
        Some(arg) => Err(CommandError::UnexpectedArgument(arg.to_string())),
        None => Ok(command),
    }
}

fn parse_tab(arg: &str) -> Result<usize, CommandError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidTab(arg.to_string())),
    }
}

/// Resolves a 1-based tab number against ids in creation order.
pub fn resolve_tab(ids: &[SessionId], tab: usize) -> Option<&SessionId> {
    tab.checked_sub(1).and_then(|index| ids.get(index))
}
