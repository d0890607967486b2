//! Serialized access to a [`SessionRouter`].
//!
//! UI calls, input typed into views and backend events can originate from
//! different tasks and threads. [`RouterService`] owns the router on a single
//! task and applies all of them one at a time, so the registry and the
//! tracker never see concurrent mutation. [`RouterHandle`] is the cloneable
//! front door.
//!
//! Per-session output order is the backend's emission order, since all
//! events travel through one FIFO channel.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{BackendEvent, SessionBackend};
use crate::error::{RouterError, RouterResult};
use crate::id::SessionId;
use crate::router::{SessionInfo, SessionRouter};
use crate::tracker::FocusChange;
use crate::view::{Dimensions, LocalInput, ViewFactory};

/// Channel capacity for UI commands.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Requests sent from a [`RouterHandle`] to the service task.
#[derive(Debug)]
enum Command {
    Create {
        reply: oneshot::Sender<RouterResult<SessionId>>,
    },
    SwitchTo {
        id: SessionId,
        reply: oneshot::Sender<RouterResult<()>>,
    },
    Close {
        id: SessionId,
    },
    Terminate {
        id: SessionId,
    },
    Write {
        id: SessionId,
        data: Vec<u8>,
    },
    Resize {
        id: SessionId,
        size: Dimensions,
    },
    ActiveId {
        reply: oneshot::Sender<Option<SessionId>>,
    },
    AllIds {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
}

/// The task that owns a [`SessionRouter`].
pub struct RouterService<B: SessionBackend, F: ViewFactory> {
    router: SessionRouter<B, F>,
    commands: mpsc::Receiver<Command>,
    inputs: mpsc::UnboundedReceiver<LocalInput>,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    shutdown: CancellationToken,
}

impl<B, F> RouterService<B, F>
where
    B: SessionBackend + 'static,
    F: ViewFactory + 'static,
{
    /// Spawns the service on the current tokio runtime.
    ///
    /// `inputs` is the receiver returned by [`SessionRouter::new`] and
    /// `events` is the backend's event stream.
    pub fn spawn(
        router: SessionRouter<B, F>,
        inputs: mpsc::UnboundedReceiver<LocalInput>,
        events: mpsc::UnboundedReceiver<BackendEvent>,
    ) -> (RouterHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let handle = RouterHandle {
            commands: command_tx,
            focus: router.focus_notifier(),
            shutdown: shutdown.clone(),
        };

        let service = Self {
            router,
            commands,
            inputs,
            events,
            shutdown,
        };

        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) {
        debug!("Router service started");

        loop {
            // Fair select, so a flooding session cannot starve commands.
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(event) = self.events.recv() => self.router.handle_event(event),
                Some(input) = self.inputs.recv() => self.router.handle_input(input),
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.drain_queued();
                        self.handle_command(command).await;
                    }
                    None => break,
                },
            }
        }

        self.router.shutdown();
        debug!("Router service stopped");
    }

    /// Applies the events and input queued ahead of a command, so the
    /// command observes them. Anything arriving later waits its turn.
    fn drain_queued(&mut self) {
        for _ in 0..self.events.len() {
            match self.events.try_recv() {
                Ok(event) => self.router.handle_event(event),
                Err(_) => break,
            }
        }
        for _ in 0..self.inputs.len() {
            match self.inputs.try_recv() {
                Ok(input) => self.router.handle_input(input),
                Err(_) => break,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create { reply } => {
                let _ = reply.send(self.router.create_session().await);
            }
            Command::SwitchTo { id, reply } => {
                let _ = reply.send(self.router.switch_to(&id));
            }
            Command::Close { id } => self.router.close_session(&id),
            Command::Terminate { id } => self.router.terminate(&id),
            Command::Write { id, data } => self.router.write(&id, &data),
            Command::Resize { id, size } => self.router.resize(&id, size),
            Command::ActiveId { reply } => {
                let _ = reply.send(self.router.active_id());
            }
            Command::AllIds { reply } => {
                let _ = reply.send(self.router.all_ids());
            }
            Command::Sessions { reply } => {
                let _ = reply.send(self.router.sessions());
            }
        }
    }
}

/// Cloneable handle to a running [`RouterService`].
#[derive(Clone)]
pub struct RouterHandle {
    commands: mpsc::Sender<Command>,
    focus: broadcast::Sender<FocusChange>,
    shutdown: CancellationToken,
}

impl RouterHandle {
    /// Creates a session and returns its id once the process is spawned.
    pub async fn create_session(&self) -> RouterResult<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Create { reply }).await?;
        rx.await.map_err(|_| RouterError::ServiceStopped)?
    }

    /// Moves focus to `id`.
    pub async fn switch_to(&self, id: SessionId) -> RouterResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SwitchTo { id, reply }).await?;
        rx.await.map_err(|_| RouterError::ServiceStopped)?
    }

    /// Asks the session's shell to exit.
    pub async fn close_session(&self, id: SessionId) -> RouterResult<()> {
        self.send(Command::Close { id }).await
    }

    /// Kills the session's process.
    pub async fn terminate(&self, id: SessionId) -> RouterResult<()> {
        self.send(Command::Terminate { id }).await
    }

    /// Forwards input to the session's process.
    pub async fn write(&self, id: SessionId, data: impl Into<Vec<u8>>) -> RouterResult<()> {
        self.send(Command::Write {
            id,
            data: data.into(),
        })
        .await
    }

    /// Resizes the session's terminal.
    pub async fn resize(&self, id: SessionId, size: Dimensions) -> RouterResult<()> {
        self.send(Command::Resize { id, size }).await
    }

    pub async fn active_id(&self) -> RouterResult<Option<SessionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ActiveId { reply }).await?;
        rx.await.map_err(|_| RouterError::ServiceStopped)
    }

    pub async fn all_ids(&self) -> RouterResult<Vec<SessionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AllIds { reply }).await?;
        rx.await.map_err(|_| RouterError::ServiceStopped)
    }

    pub async fn sessions(&self) -> RouterResult<Vec<SessionInfo>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Sessions { reply }).await?;
        rx.await.map_err(|_| RouterError::ServiceStopped)
    }

    /// Subscribes to focus changes.
    pub fn subscribe_focus(&self) -> broadcast::Receiver<FocusChange> {
        self.focus.subscribe()
    }

    /// Stops the service. Live sessions are terminated and their views
    /// released.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns true once the service has been asked to stop.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled() || self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> RouterResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(RouterError::ServiceStopped);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| RouterError::ServiceStopped)
    }
}
