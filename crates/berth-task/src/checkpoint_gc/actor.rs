use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use berth_server::actor::{Actor, ActorAction, ActorContext};

use crate::checkpoint::{CheckpointStorageConfig, CheckpointStore};
use crate::checkpoint_gc::options::CheckpointGcOptions;
use crate::container::ContainerFailure;
use crate::controller::TaskCore;
use crate::id::ContainerId;
use crate::lifecycle::ControllerKind;
use crate::message::TaskMessage;
use crate::resource_manager::{FittingRequirements, ResourceShape, TaskRequest};
use crate::spec::TaskSpec;
use crate::summary::TaskKind;

/// The controller of an internal job that deletes the checkpoints
/// an experiment no longer retains.
pub struct CheckpointGcActor {
    pub(super) core: TaskCore,
    pub(super) experiment_id: i32,
    pub(super) storage: CheckpointStorageConfig,
    pub(super) delete_tensorboards: bool,
    pub(super) task_spec: TaskSpec,
    pub(super) checkpoints: Arc<dyn CheckpointStore>,
    /// The containers that have reported termination.
    pub(super) exited: HashSet<ContainerId>,
    pub(super) failure: Option<ContainerFailure>,
}

#[async_trait]
impl Actor for CheckpointGcActor {
    type Message = TaskMessage;
    type Options = CheckpointGcOptions;

    fn new(options: CheckpointGcOptions) -> Self {
        let CheckpointGcOptions {
            task_id,
            experiment_id,
            storage,
            delete_tensorboards,
            task_spec,
            resource_pool,
            controller,
            services,
        } = options;
        let request = TaskRequest {
            id: task_id,
            name: format!("Checkpoint GC (Experiment {experiment_id})"),
            resources: ResourceShape {
                slots: 0,
                label: None,
                resource_pool,
                priority: None,
            },
            fitting: FittingRequirements { single_agent: true },
            non_preemptible: true,
        };
        let checkpoints = Arc::clone(&services.checkpoints);
        Self {
            core: TaskCore::new(TaskKind::CheckpointGc, request, None, controller, services),
            experiment_id,
            storage,
            delete_tensorboards,
            task_spec,
            checkpoints,
            exited: HashSet::new(),
            failure: None,
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        self.core.request_allocation(ctx);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: TaskMessage) -> ActorAction {
        if let Some(action) = self
            .core
            .reject_unexpected(ControllerKind::CheckpointGc, &message)
        {
            return action;
        }
        match message {
            TaskMessage::ResourcesAllocated(allocated) => {
                self.handle_resources_allocated(ctx, allocated)
            }
            TaskMessage::ReleaseResources => self.handle_release_resources(),
            TaskMessage::SessionOpened { task_id, result } => {
                self.handle_session_opened(ctx, task_id, result)
            }
            TaskMessage::CheckpointsListed { task_id, result } => {
                self.handle_checkpoints_listed(ctx, task_id, result)
            }
            TaskMessage::ContainerStateChanged(change) => {
                self.handle_container_state_changed(ctx, change)
            }
            TaskMessage::Log(log) => {
                self.core.buffer_log(log);
                ActorAction::Continue
            }
            message => self.core.receive(ctx, message),
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        self.core.shutdown().await;
    }
}
