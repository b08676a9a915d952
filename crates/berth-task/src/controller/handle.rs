use async_trait::async_trait;
use berth_server::actor::{Actor, ActorHandle};
use tokio::sync::oneshot;

use crate::allocation::ResourcesAllocated;
use crate::container::ContainerStateChanged;
use crate::error::TaskResult;
use crate::event::{EventSubscription, TaskEvent};
use crate::log::ContainerLog;
use crate::message::TaskMessage;
use crate::resource_manager::TaskHandler;
use crate::summary::TaskSummary;

/// The public face of a task controller.
/// Every method enqueues a message, so calls from one caller are
/// handled in the order they are made.
pub struct ControllerHandle<A: Actor<Message = TaskMessage>> {
    handle: ActorHandle<A>,
}

impl<A: Actor<Message = TaskMessage>> Clone for ControllerHandle<A> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<A: Actor<Message = TaskMessage>> From<ActorHandle<A>> for ControllerHandle<A> {
    fn from(handle: ActorHandle<A>) -> Self {
        Self { handle }
    }
}

impl<A: Actor<Message = TaskMessage>> ControllerHandle<A> {
    /// Returns the task summary, or `None` if the task is not visible to the user.
    /// An empty or missing filter matches every task.
    pub async fn snapshot(&self, user_filter: Option<&str>) -> TaskResult<Option<TaskSummary>> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .send(TaskMessage::RequestStatusSnapshot {
                user_filter: user_filter.map(|x| x.to_string()),
                result: tx,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn events(&self) -> TaskResult<Vec<TaskEvent>> {
        let (tx, rx) = oneshot::channel();
        self.handle.send(TaskMessage::GetEvents { result: tx }).await?;
        Ok(rx.await?)
    }

    pub async fn subscribe(&self) -> TaskResult<EventSubscription> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .send(TaskMessage::SubscribeEvents { result: tx })
            .await?;
        Ok(rx.await?)
    }

    pub async fn kill(&self) -> TaskResult<()> {
        Ok(self.handle.send(TaskMessage::Kill).await?)
    }

    pub async fn container_state_changed(&self, change: ContainerStateChanged) -> TaskResult<()> {
        Ok(self
            .handle
            .send(TaskMessage::ContainerStateChanged(change))
            .await?)
    }

    pub async fn log(&self, log: ContainerLog) -> TaskResult<()> {
        Ok(self.handle.send(TaskMessage::Log(log)).await?)
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_stopped()
    }

    pub async fn wait_for_stop(self) {
        self.handle.wait_for_stop().await
    }
}

#[async_trait]
impl<A: Actor<Message = TaskMessage>> TaskHandler for ControllerHandle<A> {
    async fn resources_allocated(&self, allocated: ResourcesAllocated) -> TaskResult<()> {
        Ok(self
            .handle
            .send(TaskMessage::ResourcesAllocated(allocated))
            .await?)
    }

    async fn release_resources(&self) -> TaskResult<()> {
        Ok(self.handle.send(TaskMessage::ReleaseResources).await?)
    }
}
