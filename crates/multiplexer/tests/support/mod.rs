//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use multiplexer::{
    BackendError, BackendEvent, Dimensions, RouterConfig, SessionBackend, SessionContext,
    SessionId, SessionRouter, SessionView, ViewFactory, DEFAULT_CLOSE_SEQUENCE,
};
use tokio::sync::mpsc;

/// A call made by the router into the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Spawn(SessionId),
    Write(SessionId, Vec<u8>),
    Resize(SessionId, Dimensions),
    Terminate(SessionId),
}

/// Backend that records calls and behaves like a well-mannered shell: the
/// close sequence or a terminate makes it report `Destroyed`.
#[derive(Clone)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_spawn: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl FakeBackend {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Self {
            calls: Arc::default(),
            fail_spawn: Arc::default(),
            events,
        };
        (backend, rx)
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn resizes_for(&self, id: &SessionId) -> Vec<Dimensions> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Resize(target, size) if &target == id => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn writes_for(&self, id: &SessionId) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(target, data) if &target == id => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn emit_output(&self, id: &SessionId, data: &[u8]) {
        let _ = self.events.send(BackendEvent::Output {
            id: id.clone(),
            data: data.to_vec(),
        });
    }

    pub fn emit_destroyed(&self, id: &SessionId) {
        let _ = self.events.send(BackendEvent::Destroyed {
            id: id.clone(),
            exit_code: Some(0),
        });
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SessionBackend for FakeBackend {
    async fn spawn(&self, id: &SessionId) -> Result<(), BackendError> {
        self.record(Call::Spawn(id.clone()));
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(BackendError::SpawnFailed("out of ptys".into()));
        }
        Ok(())
    }

    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), BackendError> {
        self.record(Call::Write(id.clone(), data.to_vec()));
        if data == DEFAULT_CLOSE_SEQUENCE {
            self.emit_output(id, b"logout\r\n");
            self.emit_destroyed(id);
        }
        Ok(())
    }

    fn resize(&self, id: &SessionId, size: Dimensions) -> Result<(), BackendError> {
        self.record(Call::Resize(id.clone(), size));
        Ok(())
    }

    fn terminate(&self, id: &SessionId) -> Result<(), BackendError> {
        self.record(Call::Terminate(id.clone()));
        let _ = self.events.send(BackendEvent::Destroyed {
            id: id.clone(),
            exit_code: None,
        });
        Ok(())
    }
}

/// Something that happened to a spy view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Attached,
    Rendered(Vec<u8>),
    Focused,
    Blurred,
    Disposed,
}

type EventLog = Arc<Mutex<Vec<ViewEvent>>>;

pub struct SpyView {
    log: EventLog,
    viewport: Arc<Mutex<Dimensions>>,
}

impl SessionView for SpyView {
    fn attach(&mut self, _context: SessionContext) {
        self.log.lock().unwrap().push(ViewEvent::Attached);
    }

    fn render(&mut self, data: &[u8]) {
        self.log.lock().unwrap().push(ViewEvent::Rendered(data.to_vec()));
    }

    fn focus(&mut self) {
        self.log.lock().unwrap().push(ViewEvent::Focused);
    }

    fn blur(&mut self) {
        self.log.lock().unwrap().push(ViewEvent::Blurred);
    }

    fn propose_dimensions(&self) -> Option<Dimensions> {
        Some(*self.viewport.lock().unwrap())
    }

    fn dispose(&mut self) {
        self.log.lock().unwrap().push(ViewEvent::Disposed);
    }
}

/// Factory handing out spy views that all share one viewport.
#[derive(Clone)]
pub struct SpyViews {
    logs: Arc<Mutex<Vec<(SessionId, EventLog)>>>,
    viewport: Arc<Mutex<Dimensions>>,
}

impl SpyViews {
    pub fn new() -> Self {
        Self {
            logs: Arc::default(),
            viewport: Arc::new(Mutex::new(Dimensions::new(24, 80))),
        }
    }

    /// Simulates the window being resized.
    pub fn set_viewport(&self, size: Dimensions) {
        *self.viewport.lock().unwrap() = size;
    }

    /// Returns everything that happened to the view of `id`.
    pub fn events(&self, id: &SessionId) -> Vec<ViewEvent> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|(target, _)| target == id)
            .map(|(_, log)| log.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn last_event(&self, id: &SessionId) -> Option<ViewEvent> {
        self.events(id).pop()
    }

    pub fn count(&self, id: &SessionId, event: &ViewEvent) -> usize {
        self.events(id).iter().filter(|e| *e == event).count()
    }

    pub fn view_count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

impl ViewFactory for SpyViews {
    type View = SpyView;

    fn create_view(&mut self, id: &SessionId) -> SpyView {
        let log = EventLog::default();
        self.logs.lock().unwrap().push((id.clone(), Arc::clone(&log)));
        SpyView {
            log,
            viewport: Arc::clone(&self.viewport),
        }
    }
}

pub struct Harness {
    pub router: SessionRouter<FakeBackend, SpyViews>,
    pub backend: FakeBackend,
    pub views: SpyViews,
    pub events: mpsc::UnboundedReceiver<BackendEvent>,
    pub inputs: mpsc::UnboundedReceiver<multiplexer::LocalInput>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let (backend, events) = FakeBackend::new();
        let views = SpyViews::new();
        let (router, inputs) = SessionRouter::new(backend.clone(), views.clone(), config);
        Self {
            router,
            backend,
            views,
            events,
            inputs,
        }
    }

    /// Applies every event the backend has emitted so far.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.router.handle_event(event);
        }
    }

    pub async fn create(&mut self) -> SessionId {
        self.router.create_session().await.unwrap()
    }
}
