use berth_server::actor::{ActorAction, ActorContext};
use log::{debug, info, warn};

use crate::allocation::ResourcesAllocated;
use crate::command::actor::CommandActor;
use crate::command::COMMAND_EXITED;
use crate::container::{Address, ContainerStarted, ContainerState, ContainerStateChanged};
use crate::controller::AllocationCount;
use crate::error::TaskResult;
use crate::event::TaskEventKind;
use crate::id::TaskId;
use crate::lifecycle::TaskLifecycle;
use crate::log::ContainerLog;
use crate::proxy::ProxyRegistration;
use crate::session::TaskSession;
use crate::spec::{LaunchSpec, TaskPayload};

impl CommandActor {
    pub(super) fn handle_resources_allocated(
        &mut self,
        ctx: &mut ActorContext<Self>,
        allocated: ResourcesAllocated,
    ) -> ActorAction {
        match self
            .core
            .accept_allocation(ctx, allocated, AllocationCount::ExactlyOne)
        {
            Ok(()) => ActorAction::Continue,
            Err(e) => ActorAction::warn(e),
        }
    }

    pub(super) fn handle_release_resources(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        info!(
            "the resource manager asks task {} to release its resources",
            self.core.task_id()
        );
        self.core.kill(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_session_opened(
        &mut self,
        ctx: &mut ActorContext<Self>,
        task_id: TaskId,
        result: TaskResult<TaskSession>,
    ) -> ActorAction {
        match self.core.session_opened(ctx, task_id, result) {
            Ok(true) => self.launch(ctx),
            Ok(false) => ActorAction::Continue,
            Err(e) => ActorAction::warn(e),
        }
    }

    fn launch(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        let task_token = match self.core.session_token() {
            Ok(x) => x,
            Err(e) => {
                self.core.terminate(ctx, e.to_string());
                return ActorAction::warn(e);
            }
        };
        let spec = LaunchSpec {
            task_id: self.core.task_id().clone(),
            task_token,
            base: self.task_spec.clone(),
            payload: TaskPayload::StartCommand {
                config: self.config.clone(),
                user_files: self.user_files.take().unwrap_or_default(),
                additional_files: self.additional_files.take().unwrap_or_default(),
            },
        };
        match self.core.launch(ctx, vec![spec]) {
            Ok(()) => ActorAction::Continue,
            Err(e) => ActorAction::warn(e),
        }
    }

    pub(super) fn handle_container_state_changed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        change: ContainerStateChanged,
    ) -> ActorAction {
        let ContainerStateChanged {
            container,
            started,
            stopped,
        } = change;
        let state = container.state;
        if self.core.lifecycle().is_terminated() && state != ContainerState::Terminated {
            debug!(
                "ignoring container {} in {state} state for terminated task {}",
                container.id,
                self.core.task_id()
            );
            return ActorAction::Continue;
        }
        debug!(
            "container {} of task {} is {state}",
            container.id,
            self.core.task_id()
        );
        self.core.record_container(container);
        match state {
            ContainerState::Running => {
                self.handle_container_running(ctx, started.unwrap_or_default())
            }
            ContainerState::Terminated => {
                let exit_status = stopped
                    .and_then(|x| x.failure)
                    .map(|x| x.to_string())
                    .unwrap_or_else(|| COMMAND_EXITED.to_string());
                self.core.terminate(ctx, exit_status);
                ActorAction::Continue
            }
            ContainerState::Assigned | ContainerState::Pulling | ContainerState::Starting => {
                ActorAction::Continue
            }
        }
    }

    fn handle_container_running(
        &mut self,
        ctx: &mut ActorContext<Self>,
        started: ContainerStarted,
    ) -> ActorAction {
        if let Err(e) = self.core.enter_running() {
            return ActorAction::warn(e);
        }
        info!(
            "task {} is running with {} address(es)",
            self.core.task_id(),
            started.addresses.len()
        );
        self.register_proxy(ctx, &started.addresses);
        self.core.addresses = started.addresses.clone();
        self.core.publish(TaskEventKind::ContainerStarted {
            addresses: started.addresses,
        });
        ActorAction::Continue
    }

    /// Registers one route per address. The first route is named after the task.
    fn register_proxy(&self, ctx: &mut ActorContext<Self>, addresses: &[Address]) {
        let (Some(routes), Some(protocol)) =
            (self.core.proxy_routes(), self.core.kind().proxy_protocol())
        else {
            return;
        };
        let task_id = self.core.task_id();
        for (index, address) in addresses.iter().enumerate() {
            let name = if index == 0 {
                task_id.to_string()
            } else {
                format!("{task_id}-{index}")
            };
            let registration = ProxyRegistration {
                name,
                address: address.host_address(),
                protocol,
            };
            let routes = routes.clone();
            ctx.spawn(async move {
                let name = registration.name.clone();
                if let Err(e) = routes.register(registration).await {
                    warn!("cannot register proxy route {name}: {e}");
                }
            });
        }
    }

    pub(super) fn handle_log(&mut self, log: ContainerLog) -> ActorAction {
        if self.core.lifecycle() == TaskLifecycle::Terminated {
            self.core.buffer_log(log);
            return ActorAction::Continue;
        }
        if !self.core.ready {
            for name in self.readiness.evaluate(&log.message) {
                debug!(
                    "task {} passed readiness check {name}",
                    self.core.task_id()
                );
            }
            if self.readiness.is_ready() {
                info!("task {} is ready", self.core.task_id());
                self.core.ready = true;
                self.core
                    .publish(TaskEventKind::ServiceReady { log: log.clone() });
            }
        }
        self.core.buffer_log(log.clone());
        self.core.publish(TaskEventKind::Log { log });
        ActorAction::Continue
    }
}
