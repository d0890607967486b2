//! PTY-backed session processes.
//!
//! [`PtyBackend`] implements [`SessionBackend`] on top of `portable-pty`.
//! Every session gets a shell attached to its own pseudo-terminal plus two
//! threads: a writer draining queued input into the PTY, and a reader that
//! forwards output as [`BackendEvent::Output`] until the PTY closes, then
//! reaps the child and reports [`BackendEvent::Destroyed`] last.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use multiplexer::{BackendError, BackendEvent, Dimensions, SessionBackend, SessionId};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use crate::config::ShellConfig;

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Value of `TERM_PROGRAM` for spawned shells.
const TERM_PROGRAM: &str = "deckshell";

/// How new shells are launched.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOptions {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub size: Dimensions,
}

impl ShellOptions {
    /// Builds launch options from the `[shell]` config section.
    ///
    /// `TERM`, `COLORTERM` and `TERM_PROGRAM` come first so user-supplied
    /// variables can override them.
    pub fn from_config(config: &ShellConfig) -> Self {
        let mut env = vec![
            ("TERM".to_string(), config.term.clone()),
            ("COLORTERM".to_string(), config.colorterm.clone()),
            ("TERM_PROGRAM".to_string(), TERM_PROGRAM.to_string()),
            (
                "TERM_PROGRAM_VERSION".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ];
        env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env,
            cwd: config.cwd.clone(),
            size: config.initial_size(),
        }
    }

    fn command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);

        match &self.cwd {
            Some(dir) => cmd.cwd(dir),
            None => {
                if let Ok(dir) = std::env::current_dir() {
                    cmd.cwd(dir);
                }
            }
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}

/// A live shell process.
struct PtyProcess {
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    pid: Option<u32>,
}

/// Handles produced on the blocking pool and consumed by the I/O threads.
struct Spawned {
    process: PtyProcess,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Session backend running real shells on pseudo-terminals.
///
/// Cloning is cheap; clones share the same processes and event stream.
#[derive(Clone)]
pub struct PtyBackend {
    processes: Arc<DashMap<SessionId, PtyProcess>>,
    events: mpsc::UnboundedSender<BackendEvent>,
    options: Arc<ShellOptions>,
}

impl PtyBackend {
    /// Creates a backend and the receiver for its event stream.
    pub fn new(options: ShellOptions) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Self {
            processes: Arc::new(DashMap::new()),
            events,
            options: Arc::new(options),
        };
        (backend, rx)
    }

    /// Returns the shell's process id for a live session.
    pub fn process_id(&self, id: &SessionId) -> Option<u32> {
        self.processes.get(id).and_then(|p| p.pid)
    }

    /// Returns the number of live processes.
    pub fn count(&self) -> usize {
        self.processes.len()
    }

    fn open(options: &ShellOptions) -> Result<Spawned, BackendError> {
        let pair = native_pty_system()
            .openpty(pty_size(options.size))
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(options.command())
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))?;

        // The child holds its own slave handle; ours would keep the PTY open
        // after the shell exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))?;

        let (input, input_rx) = mpsc::unbounded_channel();
        let process = PtyProcess {
            killer: Mutex::new(child.clone_killer()),
            pid: child.process_id(),
            master: Mutex::new(pair.master),
            input,
        };

        Ok(Spawned {
            process,
            child,
            reader,
            writer,
            input_rx,
        })
    }

    fn start_writer(
        id: &SessionId,
        mut writer: Box<dyn Write + Send>,
        mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> std::io::Result<()> {
        let session_id = id.clone();
        thread::Builder::new()
            .name(format!("pty-writer-{}", id.short()))
            .spawn(move || {
                while let Some(data) = input_rx.blocking_recv() {
                    if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                        tracing::debug!(session_id = %session_id, error = %e, "PTY write failed");
                        break;
                    }
                }
                tracing::trace!(session_id = %session_id, "PTY writer stopped");
            })?;
        Ok(())
    }

    fn start_reader(
        &self,
        id: &SessionId,
        mut reader: Box<dyn Read + Send>,
        mut child: Box<dyn Child + Send + Sync>,
    ) -> std::io::Result<()> {
        let session_id = id.clone();
        let processes = Arc::clone(&self.processes);
        let events = self.events.clone();

        thread::Builder::new()
            .name(format!("pty-reader-{}", id.short()))
            .spawn(move || {
                let mut buffer = [0u8; READ_BUFFER_SIZE];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            let event = BackendEvent::Output {
                                id: session_id.clone(),
                                data: buffer[..n].to_vec(),
                            };
                            if events.send(event).is_err() {
                                tracing::trace!(session_id = %session_id, "No receiver for output");
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // Linux reports EIO once the slave side is gone
                            tracing::debug!(session_id = %session_id, error = %e, "PTY read ended");
                            break;
                        }
                    }
                }

                let exit_code = match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Failed to reap shell");
                        None
                    }
                };

                processes.remove(&session_id);
                tracing::info!(session_id = %session_id, exit_code = ?exit_code, "Shell exited");

                let _ = events.send(BackendEvent::Destroyed {
                    id: session_id,
                    exit_code,
                });
            })?;
        Ok(())
    }
}

impl SessionBackend for PtyBackend {
    async fn spawn(&self, id: &SessionId) -> Result<(), BackendError> {
        if self.processes.contains_key(id) {
            return Err(BackendError::SpawnFailed(format!("session already exists: {id}")));
        }

        let options = Arc::clone(&self.options);
        let spawned = tokio::task::spawn_blocking(move || Self::open(&options))
            .await
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))??;

        let Spawned {
            process,
            mut child,
            reader,
            writer,
            input_rx,
        } = spawned;
        let pid = process.pid;

        match self.processes.entry(id.clone()) {
            Entry::Occupied(_) => {
                let _ = child.kill();
                return Err(BackendError::SpawnFailed(format!("session already exists: {id}")));
            }
            Entry::Vacant(slot) => {
                slot.insert(process);
            }
        }

        let started = Self::start_writer(id, writer, input_rx)
            .and_then(|_| self.start_reader(id, reader, child));
        if let Err(e) = started {
            // The child handle is gone with the thread that failed to start
            if let Some((_, process)) = self.processes.remove(id) {
                if let Ok(mut killer) = process.killer.lock() {
                    let _ = killer.kill();
                }
            }
            return Err(BackendError::Io(e));
        }

        tracing::info!(
            session_id = %id,
            pid = ?pid,
            shell = %self.options.program,
            "Spawned shell"
        );
        Ok(())
    }

    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), BackendError> {
        let process = self
            .processes
            .get(id)
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;

        process
            .input
            .send(data.to_vec())
            .map_err(|_| BackendError::WriteFailed("input channel closed".to_string()))
    }

    fn resize(&self, id: &SessionId, size: Dimensions) -> Result<(), BackendError> {
        let process = self
            .processes
            .get(id)
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;

        let master = process
            .master
            .lock()
            .map_err(|_| BackendError::ResizeFailed("PTY lock poisoned".to_string()))?;
        master
            .resize(pty_size(size))
            .map_err(|e| BackendError::ResizeFailed(e.to_string()))?;

        tracing::debug!(session_id = %id, rows = size.rows, cols = size.cols, "Resized PTY");
        Ok(())
    }

    fn terminate(&self, id: &SessionId) -> Result<(), BackendError> {
        let process = self
            .processes
            .get(id)
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;

        let mut killer = process
            .killer
            .lock()
            .map_err(|_| BackendError::TerminateFailed("killer lock poisoned".to_string()))?;
        killer
            .kill()
            .map_err(|e| BackendError::TerminateFailed(e.to_string()))
    }
}

fn pty_size(size: Dimensions) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
