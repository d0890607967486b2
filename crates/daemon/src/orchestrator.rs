//! Host orchestrator wiring the router, the PTY backend and the console.
//!
//! [`ShellOrchestrator`] owns the router service and drives it from console
//! lines: host commands are executed, everything else is typed into the
//! focused session. It also keeps the active session's PTY sized to the
//! terminal and stops once the last session is gone.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use multiplexer::{
    Dimensions, FocusChange, RouterError, RouterHandle, RouterService, SessionId, SessionRouter,
    SessionState,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::session::{PtyBackend, ShellOptions};
use crate::ui::{
    parse_line, resolve_tab, ConsoleCommand, ConsoleLine, ConsoleViewFactory, Keyboard, Sink,
    Viewport, HELP,
};

/// What the run loop does after handling a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The last session was destroyed.
    SessionsEnded,
    /// The user asked to quit.
    Quit,
    /// The shutdown token was cancelled.
    Cancelled,
}

/// Drives a console host session by session.
pub struct ShellOrchestrator {
    config: Config,
    handle: RouterHandle,
    backend: PtyBackend,
    keyboard: Keyboard,
    sink: Sink,
    viewport: Viewport,
    service: JoinHandle<()>,
    shutdown_token: CancellationToken,
}

impl ShellOrchestrator {
    /// Builds the backend and router and starts the router service.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, sink: Sink, viewport: Viewport) -> Self {
        let (backend, events) = PtyBackend::new(ShellOptions::from_config(&config.shell));
        let keyboard = Keyboard::new();
        let views = ConsoleViewFactory::new(
            sink.clone(),
            keyboard.clone(),
            viewport,
            config.console.scrollback_bytes,
        );

        let (router, inputs) =
            SessionRouter::new(backend.clone(), views, config.session.router_config());
        let (handle, service) = RouterService::spawn(router, inputs, events);

        Self {
            config,
            handle,
            backend,
            keyboard,
            sink,
            viewport,
            service,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Returns the router handle.
    pub fn handle(&self) -> &RouterHandle {
        &self.handle
    }

    /// Returns the PTY backend.
    pub fn backend(&self) -> &PtyBackend {
        &self.backend
    }

    /// Returns a token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs the host until the sessions end, the user quits or the shutdown
    /// token fires, then shuts the router down.
    ///
    /// End of input asks every session to exit and keeps running until they
    /// have.
    pub async fn run<R>(self, input: R) -> Result<ExitReason>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut focus = self.handle.subscribe_focus();
        let result = match self.handle.create_session().await {
            Ok(_) => self.event_loop(input, &mut focus).await,
            Err(e) => Err(e).context("Failed to start the first session"),
        };
        self.stop().await;
        result
    }

    async fn event_loop<R>(
        &self,
        input: R,
        focus: &mut broadcast::Receiver<FocusChange>,
    ) -> Result<ExitReason>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let period = Duration::from_millis(self.config.console.resize_poll_ms.max(10));
        let mut poll = tokio::time::interval(period);
        let mut last_size = self.viewport.dimensions();

        loop {
            // Focus changes first, so announcements precede later commands
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(ExitReason::Cancelled);
                }
                change = focus.recv() => {
                    if let Some(reason) = self.on_focus_change(change).await? {
                        return Ok(reason);
                    }
                }
                line = lines.next_line(), if input_open => {
                    match line.context("Failed to read console input")? {
                        Some(line) => {
                            if self.handle_line(&line).await? == Flow::Quit {
                                return Ok(ExitReason::Quit);
                            }
                        }
                        None => {
                            info!("Console input closed, closing all sessions");
                            input_open = false;
                            for id in self.handle.all_ids().await? {
                                self.handle.close_session(id).await?;
                            }
                        }
                    }
                }
                _ = poll.tick() => {
                    let size = self.viewport.dimensions();
                    if size.is_some() && size != last_size {
                        last_size = size;
                        if let (Some(size), Some(active)) = (size, self.handle.active_id().await?) {
                            self.handle.resize(active, size).await?;
                        }
                    }
                }
            }
        }
    }

    /// Reacts to a focus notification. Returns the exit reason once no
    /// session is left.
    async fn on_focus_change(
        &self,
        change: Result<FocusChange, broadcast::error::RecvError>,
    ) -> Result<Option<ExitReason>> {
        match change {
            Ok(FocusChange { current: Some(id), .. }) => {
                self.announce(&id).await?;
                Ok(None)
            }
            Ok(FocusChange { current: None, .. }) => {
                self.notice("last session exited");
                Ok(Some(ExitReason::SessionsEnded))
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // The dropped notification may have been the last session going away
                debug!(missed, "Focus notifications lagged");
                if self.handle.all_ids().await?.is_empty() {
                    self.notice("last session exited");
                    return Ok(Some(ExitReason::SessionsEnded));
                }
                Ok(None)
            }
            Err(broadcast::error::RecvError::Closed) => Ok(Some(ExitReason::SessionsEnded)),
        }
    }

    /// Handles one console line.
    pub async fn handle_line(&self, line: &str) -> Result<Flow> {
        match parse_line(line, &self.config.console.command_prefix) {
            Ok(ConsoleLine::Command(command)) => self.execute(command).await,
            Ok(ConsoleLine::Input(text)) => {
                if !self.keyboard.send(format!("{text}\n")) {
                    self.notice("no active session");
                }
                Ok(Flow::Continue)
            }
            Err(e) => {
                self.notice(&e.to_string());
                Ok(Flow::Continue)
            }
        }
    }

    /// Executes a host command.
    pub async fn execute(&self, command: ConsoleCommand) -> Result<Flow> {
        debug!(?command, "Executing console command");

        match command {
            ConsoleCommand::New => match self.handle.create_session().await {
                Ok(id) => debug!(session_id = %id, "Session opened from console"),
                Err(e) => self.report(e)?,
            },
            ConsoleCommand::Switch(tab) => {
                if let Some(id) = self.target(Some(tab)).await? {
                    if let Err(e) = self.handle.switch_to(id).await {
                        self.report(e)?;
                    }
                }
            }
            ConsoleCommand::Close(tab) => {
                if let Some(id) = self.target(tab).await? {
                    self.handle.close_session(id).await?;
                }
            }
            ConsoleCommand::Kill(tab) => {
                if let Some(id) = self.target(tab).await? {
                    self.handle.terminate(id).await?;
                }
            }
            ConsoleCommand::List => self.list().await?,
            ConsoleCommand::Help => self.notice(HELP),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }

        Ok(Flow::Continue)
    }

    /// Resolves a tab number, or the active session when none is given.
    async fn target(&self, tab: Option<usize>) -> Result<Option<SessionId>> {
        let id = match tab {
            Some(tab) => {
                let ids = self.handle.all_ids().await?;
                let id = resolve_tab(&ids, tab).cloned();
                if id.is_none() {
                    self.notice(&format!("no session {tab}"));
                }
                id
            }
            None => {
                let id = self.handle.active_id().await?;
                if id.is_none() {
                    self.notice("no active session");
                }
                id
            }
        };
        Ok(id)
    }

    async fn list(&self) -> Result<()> {
        let sessions = self.handle.sessions().await?;
        let mut out = String::new();

        for (index, session) in sessions.iter().enumerate() {
            let marker = if session.active { '*' } else { ' ' };
            let state = match session.state {
                SessionState::Creating => "creating",
                SessionState::Running => "running",
                SessionState::Destroying => "closing",
            };
            let size = session
                .size
                .map(|Dimensions { rows, cols }| format!("{rows}x{cols}"))
                .unwrap_or_else(|| "-".to_string());
            let pid = self
                .backend
                .process_id(&session.id)
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string());

            out.push_str(&format!(
                "{marker} {:>2}  {}  {state:<8}  {size:>7}  pid {pid}\n",
                index + 1,
                session.id.short()
            ));
        }

        self.notice(out.trim_end());
        Ok(())
    }

    async fn announce(&self, id: &SessionId) -> Result<()> {
        let ids = self.handle.all_ids().await?;
        if let Some(index) = ids.iter().position(|other| other == id) {
            self.notice(&format!("session {}/{} ({})", index + 1, ids.len(), id.short()));
        }
        Ok(())
    }

    /// Prints a user-facing router error; fails only when the router is gone.
    fn report(&self, error: RouterError) -> Result<()> {
        if matches!(error, RouterError::ServiceStopped) {
            return Err(error.into());
        }
        self.notice(&error.to_string());
        Ok(())
    }

    fn notice(&self, message: &str) {
        let mut text = String::new();
        for line in message.lines() {
            text.push_str("\r\n[deckshell] ");
            text.push_str(line);
        }
        text.push_str("\r\n");

        match self.sink.lock() {
            Ok(mut sink) => {
                if let Err(e) = sink.write_all(text.as_bytes()).and_then(|_| sink.flush()) {
                    warn!(error = %e, "Failed to write console notice");
                }
            }
            Err(_) => warn!("Console sink poisoned"),
        }
    }

    async fn stop(self) {
        self.handle.shutdown();
        if let Err(e) = self.service.await {
            warn!(error = %e, "Router service ended abnormally");
        }
        info!("Deckshell stopped");
    }
}
