use std::sync::Arc;

use berth_server::actor::{ActorAction, ActorContext};
use log::{debug, error, info};

use crate::allocation::ResourcesAllocated;
use crate::checkpoint::CheckpointRecord;
use crate::checkpoint_gc::actor::CheckpointGcActor;
use crate::checkpoint_gc::GC_COMPLETED;
use crate::container::{ContainerState, ContainerStateChanged};
use crate::controller::AllocationCount;
use crate::error::{TaskError, TaskResult};
use crate::event::TaskEventKind;
use crate::id::TaskId;
use crate::lifecycle::TaskLifecycle;
use crate::message::TaskMessage;
use crate::session::TaskSession;
use crate::spec::{LaunchSpec, TaskPayload};

impl CheckpointGcActor {
    pub(super) fn handle_resources_allocated(
        &mut self,
        ctx: &mut ActorContext<Self>,
        allocated: ResourcesAllocated,
    ) -> ActorAction {
        match self
            .core
            .accept_allocation(ctx, allocated, AllocationCount::AtLeastOne)
        {
            Ok(()) => ActorAction::Continue,
            Err(e) => ActorAction::warn(e),
        }
    }

    /// The deletion must run to completion, so the job is never preempted.
    pub(super) fn handle_release_resources(&mut self) -> ActorAction {
        info!(
            "checkpoint GC task {} ignores the request to release its resources",
            self.core.task_id()
        );
        ActorAction::Continue
    }

    pub(super) fn handle_session_opened(
        &mut self,
        ctx: &mut ActorContext<Self>,
        task_id: TaskId,
        result: TaskResult<TaskSession>,
    ) -> ActorAction {
        match self.core.session_opened(ctx, task_id, result) {
            Ok(true) => {}
            Ok(false) => return ActorAction::Continue,
            Err(e) => return ActorAction::warn(e),
        }
        let checkpoints = Arc::clone(&self.checkpoints);
        let experiment_id = self.experiment_id;
        let storage = self.storage.clone();
        let task_id = self.core.task_id().clone();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let result = checkpoints.checkpoints_to_gc(experiment_id, &storage).await;
            let _ = handle
                .send(TaskMessage::CheckpointsListed { task_id, result })
                .await;
        });
        ActorAction::Continue
    }

    pub(super) fn handle_checkpoints_listed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        task_id: TaskId,
        result: TaskResult<Vec<CheckpointRecord>>,
    ) -> ActorAction {
        if let Err(e) = self.core.check_preparing(&task_id) {
            return ActorAction::warn(e);
        }
        let to_delete = match result {
            Ok(x) => x,
            Err(e) => {
                let message = format!(
                    "cannot list checkpoints to delete for experiment {}: {e}",
                    self.experiment_id
                );
                error!("{message}");
                self.core.terminate(ctx, message);
                return ActorAction::Continue;
            }
        };
        if self.core.abort_if_kill_requested(ctx) {
            return ActorAction::Continue;
        }
        let task_token = match self.core.session_token() {
            Ok(x) => x,
            Err(e) => {
                self.core.terminate(ctx, e.to_string());
                return ActorAction::warn(e);
            }
        };
        info!(
            "task {} deletes {} checkpoint(s) of experiment {}",
            self.core.task_id(),
            to_delete.len(),
            self.experiment_id
        );
        let specs = (0..self.core.allocation_count())
            .map(|_| LaunchSpec {
                task_id: self.core.task_id().clone(),
                task_token: task_token.clone(),
                base: self.task_spec.clone(),
                payload: TaskPayload::GcCheckpoints {
                    experiment_id: self.experiment_id,
                    storage: self.storage.clone(),
                    to_delete: to_delete.clone(),
                    delete_tensorboards: self.delete_tensorboards,
                },
            })
            .collect();
        match self.core.launch(ctx, specs) {
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
            container, stopped, ..
        } = change;
        let state = container.state;
        if self.core.lifecycle().is_terminated() {
            debug!(
                "ignoring container {} in {state} state for terminated task {}",
                container.id,
                self.core.task_id()
            );
            return ActorAction::Continue;
        }
        let container_id = container.id.clone();
        self.core.record_container(container);
        match state {
            ContainerState::Running => {
                if self.core.lifecycle() == TaskLifecycle::Allocated {
                    if let Err(e) = self.core.enter_running() {
                        return ActorAction::warn(e);
                    }
                    self.core
                        .publish(TaskEventKind::ContainerStarted { addresses: vec![] });
                }
                ActorAction::Continue
            }
            ContainerState::Terminated => {
                if let Some(failure) = stopped.and_then(|x| x.failure) {
                    self.failure.get_or_insert(failure);
                }
                self.exited.insert(container_id);
                if self.exited.len() >= self.core.allocation_count().max(1) {
                    self.finish(ctx);
                }
                ActorAction::Continue
            }
            ContainerState::Assigned | ContainerState::Pulling | ContainerState::Starting => {
                ActorAction::Continue
            }
        }
    }

    /// Reports the outcome once every container has exited.
    /// A failed job has no other observer, so its buffered logs are reported too.
    fn finish(&mut self, ctx: &mut ActorContext<Self>) {
        match self.failure.clone() {
            Some(failure) => {
                let e = TaskError::ContainerFailure(failure.to_string());
                error!(
                    "checkpoint garbage collection of experiment {} failed: {e}",
                    self.experiment_id
                );
                if self.core.logs().evicted() > 0 {
                    error!(
                        "task {} has {} earlier log line(s) that are not retained",
                        self.core.task_id(),
                        self.core.logs().evicted()
                    );
                }
                for line in self.core.logs().iter() {
                    error!("{line}");
                }
                self.core.terminate(ctx, failure.to_string());
            }
            None => {
                info!(
                    "finished checkpoint garbage collection of experiment {}",
                    self.experiment_id
                );
                self.core.terminate(ctx, GC_COMPLETED);
            }
        }
    }
}
