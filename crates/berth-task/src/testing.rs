#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use berth_common::config::AppConfig;
use log::{LevelFilter, Log, Metadata, Record};
use tokio::sync::{broadcast, Semaphore};

use crate::allocation::Allocation;
use crate::checkpoint::MemoryCheckpointStore;
use crate::controller::{ControllerOptions, TaskServices};
use crate::error::{TaskError, TaskResult};
use crate::event::{TaskEvent, TaskEventKind};
use crate::id::{AllocationId, TaskId};
use crate::proxy::{MemoryProxyRegistry, ProxyRegistrar, ProxyRegistration};
use crate::resource_manager::{ResourceManager, TaskHandler, TaskRequest};
use crate::session::{MemorySessionStore, SessionStore, TaskSession};
use crate::spec::LaunchSpec;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls the condition until it holds, panicking after a timeout.
pub(crate) async fn eventually<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {description}");
}

/// Receives events until one matches the predicate.
pub(crate) async fn next_event(
    receiver: &mut broadcast::Receiver<TaskEvent>,
    predicate: impl Fn(&TaskEventKind) -> bool,
) -> TaskEvent {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let event = receiver.recv().await.unwrap();
            if predicate(&event.kind) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

pub(crate) fn count_events(events: &[TaskEvent], predicate: impl Fn(&TaskEventKind) -> bool) -> usize {
    events.iter().filter(|x| predicate(&x.kind)).count()
}

/// A thread-safe record of the calls made to a fake collaborator.
pub(crate) struct CallLog<T> {
    calls: Mutex<Vec<T>>,
}

impl<T: Clone> CallLog<T> {
    fn new() -> Self {
        Self {
            calls: Mutex::new(vec![]),
        }
    }

    fn record(&self, call: T) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|x| predicate(x)).count()
    }

    pub(crate) async fn wait_for(&self, description: &str, predicate: impl Fn(&T) -> bool) {
        eventually(description, || {
            let found = self.count(&predicate) > 0;
            async move { found }
        })
        .await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResourceCall {
    Allocate(TaskRequest),
    SetPriority(TaskId, i32),
    Release(TaskId),
}

pub(crate) struct RecordingResourceManager {
    pub(crate) calls: CallLog<ResourceCall>,
    handlers: Mutex<HashMap<TaskId, Arc<dyn TaskHandler>>>,
    allocate_delay: Option<Duration>,
}

impl RecordingResourceManager {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: CallLog::new(),
            handlers: Mutex::new(HashMap::new()),
            allocate_delay: None,
        })
    }

    /// Creates a resource manager that accepts allocation requests only after the delay.
    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: CallLog::new(),
            handlers: Mutex::new(HashMap::new()),
            allocate_delay: Some(delay),
        })
    }

    /// Waits for the allocation request of the task and returns its handler.
    pub(crate) async fn handler(&self, task_id: &TaskId) -> Arc<dyn TaskHandler> {
        eventually("the allocation request", || {
            let found = self.handlers.lock().unwrap().contains_key(task_id);
            async move { found }
        })
        .await;
        self.handlers.lock().unwrap().get(task_id).cloned().unwrap()
    }

    pub(crate) fn releases(&self, task_id: &TaskId) -> usize {
        self.calls
            .count(|x| matches!(x, ResourceCall::Release(id) if id == task_id))
    }
}

#[async_trait]
impl ResourceManager for RecordingResourceManager {
    async fn allocate(&self, request: TaskRequest, handler: Arc<dyn TaskHandler>) -> TaskResult<()> {
        if let Some(delay) = self.allocate_delay {
            tokio::time::sleep(delay).await;
        }
        self.handlers
            .lock()
            .unwrap()
            .insert(request.id.clone(), handler);
        self.calls.record(ResourceCall::Allocate(request));
        Ok(())
    }

    async fn set_priority(&self, task_id: &TaskId, priority: i32) -> TaskResult<()> {
        self.calls
            .record(ResourceCall::SetPriority(task_id.clone(), priority));
        Ok(())
    }

    async fn release(&self, task_id: &TaskId) -> TaskResult<()> {
        self.calls.record(ResourceCall::Release(task_id.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AllocationCall {
    Start(LaunchSpec),
    Kill,
}

/// An allocation whose start and kill outcomes are scripted by the test.
pub(crate) struct ScriptedAllocation {
    id: AllocationId,
    pub(crate) calls: CallLog<AllocationCall>,
    start_failure: Option<String>,
    kill_failures: AtomicUsize,
}

impl ScriptedAllocation {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            calls: CallLog::new(),
            start_failure: None,
            kill_failures: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing_start(id: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            calls: CallLog::new(),
            start_failure: Some(message.to_string()),
            kill_failures: AtomicUsize::new(0),
        })
    }

    /// Creates an allocation whose first kill attempts fail.
    pub(crate) fn failing_kill(id: &str, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            calls: CallLog::new(),
            start_failure: None,
            kill_failures: AtomicUsize::new(failures),
        })
    }

    pub(crate) fn starts(&self) -> Vec<LaunchSpec> {
        self.calls
            .snapshot()
            .into_iter()
            .filter_map(|x| match x {
                AllocationCall::Start(spec) => Some(spec),
                AllocationCall::Kill => None,
            })
            .collect()
    }

    pub(crate) fn kills(&self) -> usize {
        self.calls.count(|x| matches!(x, AllocationCall::Kill))
    }

    pub(crate) async fn wait_for_start(&self) -> LaunchSpec {
        self.calls
            .wait_for("the allocation to start", |x| {
                matches!(x, AllocationCall::Start(_))
            })
            .await;
        self.starts().remove(0)
    }
}

#[async_trait]
impl Allocation for ScriptedAllocation {
    fn id(&self) -> AllocationId {
        self.id.clone()
    }

    async fn start(&self, spec: LaunchSpec) -> TaskResult<()> {
        self.calls.record(AllocationCall::Start(spec));
        match &self.start_failure {
            Some(message) => Err(TaskError::ContainerFailure(message.clone())),
            None => Ok(()),
        }
    }

    async fn kill(&self) -> TaskResult<()> {
        self.calls.record(AllocationCall::Kill);
        let remaining = self.kill_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.kill_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TaskError::internal("the agent is unreachable"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionCall {
    Create(TaskId),
    Delete(TaskId),
}

/// A session store that records calls and can hold session creation
/// until the test adds a permit to the gate.
pub(crate) struct RecordingSessionStore {
    pub(crate) inner: MemorySessionStore,
    pub(crate) calls: CallLog<SessionCall>,
    gate: Option<Arc<Semaphore>>,
    fail_create: bool,
}

impl RecordingSessionStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySessionStore::new(),
            calls: CallLog::new(),
            gate: None,
            fail_create: false,
        })
    }

    pub(crate) fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(Self {
            inner: MemorySessionStore::new(),
            calls: CallLog::new(),
            gate: Some(Arc::clone(&gate)),
            fail_create: false,
        });
        (store, gate)
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySessionStore::new(),
            calls: CallLog::new(),
            gate: None,
            fail_create: true,
        })
    }

    pub(crate) fn creates(&self) -> usize {
        self.calls.count(|x| matches!(x, SessionCall::Create(_)))
    }

    pub(crate) fn deletes(&self) -> usize {
        self.calls.count(|x| matches!(x, SessionCall::Delete(_)))
    }
}

#[async_trait]
impl SessionStore for RecordingSessionStore {
    async fn create_session(&self, task_id: &TaskId) -> TaskResult<TaskSession> {
        self.calls.record(SessionCall::Create(task_id.clone()));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail_create {
            return Err(TaskError::internal("the database is unavailable"));
        }
        self.inner.create_session(task_id).await
    }

    async fn delete_session(&self, task_id: &TaskId) -> TaskResult<()> {
        self.calls.record(SessionCall::Delete(task_id.clone()));
        self.inner.delete_session(task_id).await
    }
}

/// A proxy registry whose unregistration always fails.
pub(crate) struct StickyProxyRegistry {
    pub(crate) inner: MemoryProxyRegistry,
}

#[async_trait]
impl ProxyRegistrar for StickyProxyRegistry {
    async fn register(&self, registration: ProxyRegistration) -> TaskResult<()> {
        self.inner.register(registration).await
    }

    async fn unregister(&self, name: &str) -> TaskResult<()> {
        Err(TaskError::internal(format!("cannot remove route {name}")))
    }
}

/// The collaborators of a controller under test.
pub(crate) struct Harness {
    pub(crate) resource_manager: Arc<RecordingResourceManager>,
    pub(crate) sessions: Arc<RecordingSessionStore>,
    pub(crate) proxy: Arc<MemoryProxyRegistry>,
    pub(crate) checkpoints: Arc<MemoryCheckpointStore>,
    proxy_registrar: Option<Arc<dyn ProxyRegistrar>>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_sessions(RecordingSessionStore::new())
    }

    pub(crate) fn with_sessions(sessions: Arc<RecordingSessionStore>) -> Self {
        Self {
            resource_manager: RecordingResourceManager::new(),
            sessions,
            proxy: Arc::new(MemoryProxyRegistry::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            proxy_registrar: None,
        }
    }

    pub(crate) fn with_resource_manager(mut self, resource_manager: Arc<RecordingResourceManager>) -> Self {
        self.resource_manager = resource_manager;
        self
    }

    pub(crate) fn with_proxy_registrar(mut self, registrar: Arc<dyn ProxyRegistrar>) -> Self {
        self.proxy_registrar = Some(registrar);
        self
    }

    pub(crate) fn services(&self) -> TaskServices {
        TaskServices {
            resource_manager: self.resource_manager.clone(),
            sessions: self.sessions.clone(),
            proxy: self
                .proxy_registrar
                .clone()
                .unwrap_or_else(|| self.proxy.clone() as Arc<dyn ProxyRegistrar>),
            checkpoints: self.checkpoints.clone(),
        }
    }
}

pub(crate) fn app_config() -> AppConfig {
    AppConfig::load().unwrap()
}

pub(crate) fn controller_options() -> ControllerOptions {
    ControllerOptions::new(&app_config())
}

static CAPTURED_LOGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static INSTALL_LOGGER: Once = Once::new();

/// Records every log message of the test binary as `LEVEL message`.
struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED_LOGS
            .lock()
            .unwrap()
            .push(format!("{} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

/// Installs the capturing logger. Tests running in parallel share it,
/// so callers must filter the captured messages by something unique to them.
pub(crate) fn capture_logs() {
    INSTALL_LOGGER.call_once(|| {
        log::set_logger(&CapturingLogger).unwrap();
        log::set_max_level(LevelFilter::Debug);
    });
}

pub(crate) fn captured_logs(predicate: impl Fn(&str) -> bool) -> Vec<String> {
    CAPTURED_LOGS
        .lock()
        .unwrap()
        .iter()
        .filter(|x| predicate(x))
        .cloned()
        .collect()
}
