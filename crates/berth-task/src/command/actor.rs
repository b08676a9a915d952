use async_trait::async_trait;
use berth_server::actor::{Actor, ActorAction, ActorContext};

use crate::command::options::CommandOptions;
use crate::controller::TaskCore;
use crate::lifecycle::ControllerKind;
use crate::message::TaskMessage;
use crate::readiness::ReadinessChecks;
use crate::resource_manager::{FittingRequirements, ResourceShape, TaskRequest};
use crate::spec::{CommandConfig, FileBundle, TaskSpec};

/// The controller of an interactive or batch command task.
pub struct CommandActor {
    pub(super) core: TaskCore,
    pub(super) config: CommandConfig,
    pub(super) task_spec: TaskSpec,
    /// The file bundles are taken out once the container is launched.
    pub(super) user_files: Option<FileBundle>,
    pub(super) additional_files: Option<FileBundle>,
    pub(super) readiness: ReadinessChecks,
}

#[async_trait]
impl Actor for CommandActor {
    type Message = TaskMessage;
    type Options = CommandOptions;

    fn new(options: CommandOptions) -> Self {
        let CommandOptions {
            task_id,
            kind,
            owner,
            config,
            task_spec,
            user_files,
            additional_files,
            readiness_checks,
            controller,
            services,
        } = options;
        let name = if config.description.is_empty() {
            format!("{kind} ({task_id})")
        } else {
            config.description.clone()
        };
        let request = TaskRequest {
            id: task_id,
            name,
            resources: ResourceShape {
                slots: config.resources.slots,
                label: config.resources.agent_label.clone(),
                resource_pool: config.resources.resource_pool.clone(),
                priority: config.resources.priority,
            },
            fitting: FittingRequirements::default(),
            non_preemptible: true,
        };
        Self {
            core: TaskCore::new(kind, request, Some(owner), controller, services),
            config,
            task_spec,
            user_files: Some(user_files),
            additional_files: Some(additional_files),
            readiness: readiness_checks,
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        self.core.request_allocation(ctx);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: TaskMessage) -> ActorAction {
        if let Some(action) = self.core.reject_unexpected(ControllerKind::Command, &message) {
            return action;
        }
        match message {
            TaskMessage::ResourcesAllocated(allocated) => {
                self.handle_resources_allocated(ctx, allocated)
            }
            TaskMessage::ReleaseResources => self.handle_release_resources(ctx),
            TaskMessage::SessionOpened { task_id, result } => {
                self.handle_session_opened(ctx, task_id, result)
            }
            TaskMessage::ContainerStateChanged(change) => {
                self.handle_container_state_changed(ctx, change)
            }
            TaskMessage::Log(log) => self.handle_log(log),
            message => self.core.receive(ctx, message),
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        self.core.shutdown().await;
    }
}
