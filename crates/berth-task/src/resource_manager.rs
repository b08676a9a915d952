use std::sync::Arc;

use async_trait::async_trait;

use crate::allocation::ResourcesAllocated;
use crate::error::TaskResult;
use crate::id::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceShape {
    pub slots: usize,
    pub label: Option<String>,
    pub resource_pool: Option<String>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FittingRequirements {
    pub single_agent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub id: TaskId,
    pub name: String,
    pub resources: ResourceShape,
    pub fitting: FittingRequirements,
    pub non_preemptible: bool,
}

/// The controller endpoint the resource manager reports back to.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn resources_allocated(&self, allocated: ResourcesAllocated) -> TaskResult<()>;
    async fn release_resources(&self) -> TaskResult<()>;
}

#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    /// Queues the request. The grant arrives later through the handler.
    async fn allocate(&self, request: TaskRequest, handler: Arc<dyn TaskHandler>)
        -> TaskResult<()>;
    async fn set_priority(&self, task_id: &TaskId, priority: i32) -> TaskResult<()>;
    /// Returns the task's resources to the pool. This is idempotent.
    async fn release(&self, task_id: &TaskId) -> TaskResult<()>;
}
