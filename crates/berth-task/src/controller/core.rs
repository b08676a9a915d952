use std::fmt;
use std::sync::Arc;

use berth_server::actor::{Actor, ActorAction, ActorContext};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use crate::allocation::{Allocation, ResourcesAllocated};
use crate::container::{Address, Container};
use crate::controller::handle::ControllerHandle;
use crate::controller::options::ControllerOptions;
use crate::controller::services::TaskServices;
use crate::error::{TaskError, TaskResult};
use crate::event::{EventStream, EventSubscription, TaskEvent, TaskEventKind};
use crate::id::{AllocationId, TaskId};
use crate::lifecycle::{ControllerKind, TaskLifecycle};
use crate::log::{ContainerLog, LogBuffer};
use crate::message::TaskMessage;
use crate::proxy::ProxyRoutes;
use crate::resource_manager::{ResourceManager, TaskHandler, TaskRequest};
use crate::session::{SessionStore, TaskSession};
use crate::spec::LaunchSpec;
use crate::summary::{TaskKind, TaskOwner, TaskStatus, TaskSummary};

pub(crate) const ABORTED_BEFORE_SCHEDULING: &str = "task is aborted without being scheduled";
pub(crate) const KILLED_BEFORE_START: &str = "task is killed before the container is started";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocationCount {
    ExactlyOne,
    AtLeastOne,
}

impl AllocationCount {
    fn permits(&self, count: usize) -> bool {
        match self {
            AllocationCount::ExactlyOne => count == 1,
            AllocationCount::AtLeastOne => count >= 1,
        }
    }
}

impl fmt::Display for AllocationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationCount::ExactlyOne => write!(f, "exactly one allocation"),
            AllocationCount::AtLeastOne => write!(f, "at least one allocation"),
        }
    }
}

enum LaunchPhase {
    /// The session (and any other input of the launch) is being prepared.
    Preparing,
    Started,
}

enum CleanupPhase {
    InProgress,
    Completed,
}

enum TaskState {
    AwaitingAllocation,
    Allocated {
        allocations: Vec<Arc<dyn Allocation>>,
        launch: LaunchPhase,
    },
    Running {
        allocations: Vec<Arc<dyn Allocation>>,
    },
    Terminated {
        cleanup: CleanupPhase,
    },
    GarbageCollected,
}

impl TaskState {
    fn lifecycle(&self) -> TaskLifecycle {
        match self {
            TaskState::AwaitingAllocation => TaskLifecycle::AwaitingAllocation,
            TaskState::Allocated { .. } => TaskLifecycle::Allocated,
            TaskState::Running { .. } => TaskLifecycle::Running,
            TaskState::Terminated { .. } => TaskLifecycle::Terminated,
            TaskState::GarbageCollected => TaskLifecycle::GarbageCollected,
        }
    }
}

/// The resources a terminated task gives back, in the order they are released.
struct Cleanup {
    task_id: TaskId,
    proxy: Option<ProxyRoutes>,
    /// Becomes `true` once the allocation request has reached the resource manager.
    allocation_requested: Option<watch::Receiver<bool>>,
    resource_manager: Arc<dyn ResourceManager>,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl Cleanup {
    /// Every step runs even if an earlier step fails.
    async fn run(mut self) {
        if let Some(proxy) = &self.proxy {
            proxy.retract().await;
        }
        if let Some(mut requested) = self.allocation_requested.take() {
            // The sender is dropped without a value if the request task is aborted.
            let _ = requested.wait_for(|x| *x).await;
        }
        let task_id = &self.task_id;
        if let Err(e) = self.resource_manager.release(task_id).await {
            let e = TaskError::CleanupFailure(format!("cannot release resources of task {task_id}: {e}"));
            warn!("{e}");
        }
        if let Some(sessions) = &self.sessions {
            if let Err(e) = sessions.delete_session(task_id).await {
                let e = TaskError::CleanupFailure(format!("cannot delete session of task {task_id}: {e}"));
                warn!("{e}");
            }
        }
    }
}

/// The lifecycle state machine shared by all task controllers.
///
/// The controller actors own a core each and delegate the common
/// transitions (allocation, session preparation, launch, kill, termination
/// and garbage collection) to it. Collaborator calls never run inside the
/// actor; they are spawned and their outcome comes back as a [`TaskMessage`].
pub(crate) struct TaskCore {
    kind: TaskKind,
    request: TaskRequest,
    owner: Option<TaskOwner>,
    start_time: DateTime<Utc>,
    resource_pool: Option<String>,
    state: TaskState,
    pub(crate) container: Option<Container>,
    pub(crate) addresses: Vec<Address>,
    pub(crate) ready: bool,
    session: Option<TaskSession>,
    /// Whether a session may exist for the task, so that cleanup deletes it.
    session_requested: bool,
    kill_requested: bool,
    exit_status: Option<String>,
    events: EventStream,
    logs: LogBuffer,
    proxy: Option<ProxyRoutes>,
    allocation_requested: Option<watch::Receiver<bool>>,
    gc_timer: Option<AbortHandle>,
    options: ControllerOptions,
    services: TaskServices,
}

impl TaskCore {
    pub(crate) fn new(
        kind: TaskKind,
        request: TaskRequest,
        owner: Option<TaskOwner>,
        options: ControllerOptions,
        services: TaskServices,
    ) -> Self {
        let proxy = kind
            .proxy_protocol()
            .map(|_| ProxyRoutes::new(Arc::clone(&services.proxy)));
        Self {
            kind,
            resource_pool: request.resources.resource_pool.clone(),
            request,
            owner,
            start_time: Utc::now(),
            state: TaskState::AwaitingAllocation,
            container: None,
            addresses: vec![],
            ready: false,
            session: None,
            session_requested: false,
            kill_requested: false,
            exit_status: None,
            events: EventStream::new(options.event_channel_capacity),
            logs: LogBuffer::new(options.log_buffer_size),
            proxy,
            allocation_requested: None,
            gc_timer: None,
            options,
            services,
        }
    }

    pub(crate) fn kind(&self) -> TaskKind {
        self.kind
    }

    pub(crate) fn task_id(&self) -> &TaskId {
        &self.request.id
    }

    pub(crate) fn lifecycle(&self) -> TaskLifecycle {
        self.state.lifecycle()
    }

    pub(crate) fn proxy_routes(&self) -> Option<ProxyRoutes> {
        self.proxy.clone()
    }

    pub(crate) fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub(crate) fn buffer_log(&mut self, log: ContainerLog) {
        self.logs.push(log);
    }

    /// The number of allocations the task holds, or zero before allocation.
    pub(crate) fn allocation_count(&self) -> usize {
        self.allocations().len()
    }

    fn allocations(&self) -> &[Arc<dyn Allocation>] {
        match &self.state {
            TaskState::Allocated { allocations, .. } | TaskState::Running { allocations } => {
                allocations
            }
            _ => &[],
        }
    }

    fn status(&self) -> TaskStatus {
        if self.lifecycle().is_terminated() {
            return TaskStatus::Terminated;
        }
        match (&self.container, &self.state) {
            (Some(container), _) => container.state.into(),
            (None, TaskState::AwaitingAllocation) => TaskStatus::Pending,
            (None, _) => TaskStatus::Assigned,
        }
    }

    pub(crate) fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.request.id.clone(),
            kind: self.kind,
            description: self.request.name.clone(),
            state: self.status(),
            lifecycle: self.lifecycle(),
            container: self.container.clone(),
            owner: self.owner.clone(),
            start_time: self.start_time,
            resource_pool: self.resource_pool.clone(),
            slots: self.request.resources.slots,
            exit_status: self.exit_status.clone(),
            service_address: self
                .kind
                .service_address(&self.options.proxy_path_prefix, &self.request.id),
            addresses: self.addresses.clone(),
            ready: self.ready,
        }
    }

    pub(crate) fn publish(&mut self, kind: TaskEventKind) {
        let snapshot = self.summary();
        self.events.publish(snapshot, kind);
    }

    fn transition(&mut self, next: TaskState) -> TaskResult<()> {
        let (from, to) = (self.lifecycle(), next.lifecycle());
        if !from.can_transition_to(to) {
            return Err(TaskError::unexpected(format!(
                "task {} cannot move from {from} to {to}",
                self.request.id
            )));
        }
        debug!("task {} moves from {from} to {to}", self.request.id);
        self.state = next;
        Ok(())
    }

    pub(crate) fn reply_snapshot(
        &self,
        user_filter: Option<String>,
        result: oneshot::Sender<Option<TaskSummary>>,
    ) {
        let visible = match user_filter.as_deref() {
            None | Some("") => true,
            Some(user) => self.owner.as_ref().is_some_and(|x| x.username == user),
        };
        let _ = result.send(visible.then(|| self.summary()));
    }

    pub(crate) fn reply_events(&self, result: oneshot::Sender<Vec<TaskEvent>>) {
        let _ = result.send(self.events.history().to_vec());
    }

    pub(crate) fn reply_subscription(&self, result: oneshot::Sender<EventSubscription>) {
        let _ = result.send(self.events.subscribe());
    }

    /// Returns the action for a message the controller does not expect
    /// in its current state, or `None` if the message is expected.
    pub(crate) fn reject_unexpected(
        &self,
        controller: ControllerKind,
        message: &TaskMessage,
    ) -> Option<ActorAction> {
        let operation = message.operation();
        let lifecycle = self.lifecycle();
        if controller.accepts(lifecycle, operation) {
            return None;
        }
        Some(ActorAction::warn(TaskError::unexpected(format!(
            "task {} does not expect {operation} in {lifecycle} state",
            self.request.id
        ))))
    }

    /// Handles the messages that every task controller treats the same way.
    pub(crate) fn receive<A>(&mut self, ctx: &mut ActorContext<A>, message: TaskMessage) -> ActorAction
    where
        A: Actor<Message = TaskMessage>,
    {
        match message {
            TaskMessage::RequestStatusSnapshot {
                user_filter,
                result,
            } => self.reply_snapshot(user_filter, result),
            TaskMessage::GetEvents { result } => self.reply_events(result),
            TaskMessage::SubscribeEvents { result } => self.reply_subscription(result),
            TaskMessage::Kill => self.kill(ctx),
            TaskMessage::AllocationRequestFailed { message } => {
                self.allocation_request_failed(ctx, message)
            }
            TaskMessage::ContainerStartFailed {
                allocation_id,
                message,
            } => self.container_start_failed(ctx, allocation_id, message),
            TaskMessage::KillFailed { message } => self.kill_failed(message),
            TaskMessage::CleanupCompleted => {
                if let Err(e) = self.cleanup_completed(ctx) {
                    return ActorAction::warn(e);
                }
            }
            TaskMessage::TerminateForGc => {
                return match self.garbage_collect() {
                    Ok(()) => ActorAction::Stop,
                    Err(e) => ActorAction::warn(e),
                };
            }
            message => {
                return ActorAction::warn(TaskError::unexpected(format!(
                    "task {} has no handler for {}",
                    self.request.id,
                    message.operation()
                )));
            }
        }
        ActorAction::Continue
    }

    /// Asks the resource manager for resources. The grant comes back
    /// as [`TaskMessage::ResourcesAllocated`].
    pub(crate) fn request_allocation<A>(&mut self, ctx: &mut ActorContext<A>)
    where
        A: Actor<Message = TaskMessage>,
    {
        let handler: Arc<dyn TaskHandler> = Arc::new(ControllerHandle::from(ctx.handle().clone()));
        let resource_manager = Arc::clone(&self.services.resource_manager);
        let request = self.request.clone();
        let handle = ctx.handle().clone();
        let (requested, receiver) = watch::channel(false);
        self.allocation_requested = Some(receiver);
        ctx.spawn(async move {
            let task_id = request.id.clone();
            let priority = request.resources.priority;
            if let Err(e) = resource_manager.allocate(request, handler).await {
                let _ = requested.send(true);
                let _ = handle
                    .send(TaskMessage::AllocationRequestFailed {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
            if let Some(priority) = priority {
                if let Err(e) = resource_manager.set_priority(&task_id, priority).await {
                    warn!("cannot set priority {priority} for task {task_id}: {e}");
                }
            }
            // The release during cleanup waits for this signal.
            let _ = requested.send(true);
        });
        info!("task {} is scheduled", self.request.id);
        self.publish(TaskEventKind::Scheduled);
    }

    pub(crate) fn allocation_request_failed<A>(&mut self, ctx: &mut ActorContext<A>, message: String)
    where
        A: Actor<Message = TaskMessage>,
    {
        if self.lifecycle() != TaskLifecycle::AwaitingAllocation {
            debug!("ignoring allocation request failure for task {}: {message}", self.request.id);
            return;
        }
        error!("cannot request resources for task {}: {message}", self.request.id);
        self.terminate(ctx, format!("cannot request resources: {message}"));
    }

    /// Accepts the allocation and starts preparing the launch.
    /// Stale allocations are rejected without any state change.
    pub(crate) fn accept_allocation<A>(
        &mut self,
        ctx: &mut ActorContext<A>,
        allocated: ResourcesAllocated,
        expected: AllocationCount,
    ) -> TaskResult<()>
    where
        A: Actor<Message = TaskMessage>,
    {
        if allocated.id != self.request.id {
            return Err(TaskError::StaleAllocation(format!(
                "task {} ignores resources allocated for task {}",
                self.request.id, allocated.id
            )));
        }
        if self.lifecycle() != TaskLifecycle::AwaitingAllocation {
            return Err(TaskError::StaleAllocation(format!(
                "task {} ignores resources allocated in {} state",
                self.request.id,
                self.lifecycle()
            )));
        }
        let count = allocated.allocations.len();
        if !expected.permits(count) {
            let message = format!(
                "task {} expects {expected} but received {count}",
                self.request.id
            );
            error!("{message}");
            self.terminate(ctx, message.clone());
            return Err(TaskError::unexpected(message));
        }
        if allocated.resource_pool.is_some() {
            self.resource_pool = allocated.resource_pool;
        }
        self.transition(TaskState::Allocated {
            allocations: allocated.allocations,
            launch: LaunchPhase::Preparing,
        })?;
        info!("task {} is assigned {count} allocation(s)", self.request.id);
        self.publish(TaskEventKind::Assigned { allocations: count });

        self.session_requested = true;
        let sessions = Arc::clone(&self.services.sessions);
        let task_id = self.request.id.clone();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let result = sessions
                .create_session(&task_id)
                .await
                .map_err(|e| TaskError::SessionCreateFailure(e.to_string()));
            let _ = handle
                .send(TaskMessage::SessionOpened { task_id, result })
                .await;
        });
        Ok(())
    }

    /// Ensures that a preparation step reported for the task is still relevant.
    pub(crate) fn check_preparing(&self, task_id: &TaskId) -> TaskResult<()> {
        if *task_id != self.request.id {
            return Err(TaskError::StaleAllocation(format!(
                "task {} ignores launch preparation of task {task_id}",
                self.request.id
            )));
        }
        match &self.state {
            TaskState::Allocated {
                launch: LaunchPhase::Preparing,
                ..
            } => Ok(()),
            _ => Err(TaskError::unexpected(format!(
                "task {} is not preparing its launch in {} state",
                self.request.id,
                self.lifecycle()
            ))),
        }
    }

    /// Records the opened session.
    /// Returns whether the launch preparation can continue.
    pub(crate) fn session_opened<A>(
        &mut self,
        ctx: &mut ActorContext<A>,
        task_id: TaskId,
        result: TaskResult<TaskSession>,
    ) -> TaskResult<bool>
    where
        A: Actor<Message = TaskMessage>,
    {
        if let Err(e) = self.check_preparing(&task_id) {
            if result.is_ok() && task_id == self.request.id {
                // The cleanup may have run before the session was created.
                self.discard_session(ctx);
            }
            return Err(e);
        }
        match result {
            Ok(session) => {
                debug!("task {} opened its session", self.request.id);
                self.session = Some(session);
            }
            Err(e) => {
                error!("task {}: {e}", self.request.id);
                self.terminate(ctx, e.to_string());
                return Ok(false);
            }
        }
        Ok(!self.abort_if_kill_requested(ctx))
    }

    fn discard_session<A>(&self, ctx: &mut ActorContext<A>)
    where
        A: Actor<Message = TaskMessage>,
    {
        let sessions = Arc::clone(&self.services.sessions);
        let task_id = self.request.id.clone();
        ctx.spawn(async move {
            if let Err(e) = sessions.delete_session(&task_id).await {
                warn!("cannot delete session of task {task_id}: {e}");
            }
        });
    }

    /// Terminates the task if it was killed while the launch was being prepared.
    pub(crate) fn abort_if_kill_requested<A>(&mut self, ctx: &mut ActorContext<A>) -> bool
    where
        A: Actor<Message = TaskMessage>,
    {
        if !self.kill_requested {
            return false;
        }
        info!("task {} is killed before its launch", self.request.id);
        self.terminate(ctx, KILLED_BEFORE_START);
        true
    }

    pub(crate) fn session_token(&self) -> TaskResult<String> {
        self.session
            .as_ref()
            .map(|x| x.token().to_string())
            .ok_or_else(|| TaskError::internal(format!("task {} has no session", self.request.id)))
    }

    /// Starts every allocation with its launch spec.
    pub(crate) fn launch<A>(&mut self, ctx: &mut ActorContext<A>, specs: Vec<LaunchSpec>) -> TaskResult<()>
    where
        A: Actor<Message = TaskMessage>,
    {
        let task_id = self.request.id.clone();
        let lifecycle = self.lifecycle();
        let TaskState::Allocated {
            allocations,
            launch,
        } = &mut self.state
        else {
            return Err(TaskError::unexpected(format!(
                "task {task_id} cannot launch in {lifecycle} state"
            )));
        };
        if !matches!(launch, LaunchPhase::Preparing) {
            return Err(TaskError::unexpected(format!(
                "task {task_id} is already launched"
            )));
        }
        if specs.len() != allocations.len() {
            return Err(TaskError::internal(format!(
                "task {task_id} has {} launch spec(s) for {} allocation(s)",
                specs.len(),
                allocations.len()
            )));
        }
        *launch = LaunchPhase::Started;
        for (allocation, spec) in allocations.iter().zip(specs) {
            let allocation = Arc::clone(allocation);
            let handle = ctx.handle().clone();
            ctx.spawn(async move {
                if let Err(e) = allocation.start(spec).await {
                    let _ = handle
                        .send(TaskMessage::ContainerStartFailed {
                            allocation_id: allocation.id(),
                            message: e.to_string(),
                        })
                        .await;
                }
            });
        }
        info!("task {task_id} is launched");
        Ok(())
    }

    pub(crate) fn container_start_failed<A>(
        &mut self,
        ctx: &mut ActorContext<A>,
        allocation_id: AllocationId,
        message: String,
    ) where
        A: Actor<Message = TaskMessage>,
    {
        if self.lifecycle().is_terminated() {
            debug!(
                "ignoring start failure of allocation {allocation_id} for terminated task {}",
                self.request.id
            );
            return;
        }
        error!(
            "cannot start allocation {allocation_id} of task {}: {message}",
            self.request.id
        );
        self.kill_allocations(ctx, Some(&allocation_id));
        self.terminate(ctx, format!("container failed to start: {message}"));
    }

    pub(crate) fn record_container(&mut self, container: Container) {
        self.container = Some(container);
    }

    pub(crate) fn enter_running(&mut self) -> TaskResult<()> {
        match std::mem::replace(&mut self.state, TaskState::AwaitingAllocation) {
            TaskState::Allocated {
                allocations,
                launch: LaunchPhase::Started,
            } => {
                debug!("task {} moves from allocated to running", self.request.id);
                self.state = TaskState::Running { allocations };
                Ok(())
            }
            other => {
                let lifecycle = other.lifecycle();
                self.state = other;
                Err(TaskError::unexpected(format!(
                    "task {} cannot start running in {lifecycle} state",
                    self.request.id
                )))
            }
        }
    }

    pub(crate) fn kill<A>(&mut self, ctx: &mut ActorContext<A>)
    where
        A: Actor<Message = TaskMessage>,
    {
        match self.lifecycle() {
            TaskLifecycle::AwaitingAllocation => {
                info!("task {} is killed before it is scheduled", self.request.id);
                self.kill_requested = true;
                self.publish(TaskEventKind::TerminateRequested);
                self.terminate(ctx, ABORTED_BEFORE_SCHEDULING);
            }
            TaskLifecycle::Allocated | TaskLifecycle::Running => {
                if self.kill_requested {
                    debug!("task {} is already being killed", self.request.id);
                    return;
                }
                self.kill_requested = true;
                self.publish(TaskEventKind::TerminateRequested);
                if let TaskState::Allocated {
                    launch: LaunchPhase::Preparing,
                    ..
                } = &self.state
                {
                    info!(
                        "task {} will be terminated once its launch preparation completes",
                        self.request.id
                    );
                    return;
                }
                info!("killing task {}", self.request.id);
                self.kill_allocations(ctx, None);
            }
            TaskLifecycle::Terminated | TaskLifecycle::GarbageCollected => {
                debug!("ignoring kill request for terminated task {}", self.request.id);
            }
        }
    }

    fn kill_allocations<A>(&self, ctx: &mut ActorContext<A>, except: Option<&AllocationId>)
    where
        A: Actor<Message = TaskMessage>,
    {
        for allocation in self.allocations() {
            if except.is_some_and(|x| *x == allocation.id()) {
                continue;
            }
            let allocation = Arc::clone(allocation);
            let handle = ctx.handle().clone();
            ctx.spawn(async move {
                if let Err(e) = allocation.kill().await {
                    let _ = handle
                        .send(TaskMessage::KillFailed {
                            message: format!("cannot kill allocation {}: {e}", allocation.id()),
                        })
                        .await;
                }
            });
        }
    }

    /// Clears the pending kill so that a later kill request tries again.
    pub(crate) fn kill_failed(&mut self, message: String) {
        warn!("task {}: {message}", self.request.id);
        if matches!(
            self.lifecycle(),
            TaskLifecycle::Allocated | TaskLifecycle::Running
        ) {
            self.kill_requested = false;
        }
    }

    /// Records the exit status and releases everything the task holds.
    /// Only the first call has any effect.
    pub(crate) fn terminate<A>(&mut self, ctx: &mut ActorContext<A>, exit_status: impl Into<String>)
    where
        A: Actor<Message = TaskMessage>,
    {
        let exit_status = exit_status.into();
        if self.lifecycle().is_terminated() {
            debug!(
                "task {} is already terminated, ignoring exit status: {exit_status}",
                self.request.id
            );
            return;
        }
        if let Err(e) = self.transition(TaskState::Terminated {
            cleanup: CleanupPhase::InProgress,
        }) {
            error!("{e}");
            return;
        }
        info!("task {} is terminated: {exit_status}", self.request.id);
        self.exit_status = Some(exit_status);
        let cleanup = self.cleanup();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            cleanup.run().await;
            let _ = handle.send(TaskMessage::CleanupCompleted).await;
        });
    }

    fn cleanup(&self) -> Cleanup {
        Cleanup {
            task_id: self.request.id.clone(),
            proxy: self.proxy.clone(),
            allocation_requested: self.allocation_requested.clone(),
            resource_manager: Arc::clone(&self.services.resource_manager),
            sessions: self
                .session_requested
                .then(|| Arc::clone(&self.services.sessions)),
        }
    }

    /// Publishes the exit event and arms the garbage collection timer.
    pub(crate) fn cleanup_completed<A>(&mut self, ctx: &mut ActorContext<A>) -> TaskResult<()>
    where
        A: Actor<Message = TaskMessage>,
    {
        match &mut self.state {
            TaskState::Terminated { cleanup } if matches!(cleanup, CleanupPhase::InProgress) => {
                *cleanup = CleanupPhase::Completed;
            }
            _ => {
                return Err(TaskError::unexpected(format!(
                    "task {} has no cleanup in progress",
                    self.request.id
                )));
            }
        }
        let exit_status = self.exit_status.clone().unwrap_or_default();
        self.publish(TaskEventKind::Exited { exit_status });
        self.gc_timer = Some(ctx.send_with_delay(
            TaskMessage::TerminateForGc,
            self.options.terminated_retention,
        ));
        Ok(())
    }

    pub(crate) fn garbage_collect(&mut self) -> TaskResult<()> {
        if matches!(
            self.state,
            TaskState::Terminated {
                cleanup: CleanupPhase::InProgress
            }
        ) {
            return Err(TaskError::unexpected(format!(
                "task {} cannot be garbage collected before its cleanup completes",
                self.request.id
            )));
        }
        self.transition(TaskState::GarbageCollected)?;
        self.gc_timer = None;
        info!("task {} is garbage collected", self.request.id);
        Ok(())
    }

    /// Runs when the controller stops.
    /// A controller that stops before its cleanup completes cleans up inline.
    pub(crate) async fn shutdown(mut self) {
        if let Some(timer) = self.gc_timer.take() {
            timer.abort();
        }
        let finished = matches!(
            self.state,
            TaskState::GarbageCollected
                | TaskState::Terminated {
                    cleanup: CleanupPhase::Completed
                }
        );
        if !finished {
            warn!(
                "task controller {} stopped in {} state, cleaning up",
                self.request.id,
                self.lifecycle()
            );
            self.cleanup().run().await;
        }
        info!("task controller {} stopped", self.request.id);
    }
}
