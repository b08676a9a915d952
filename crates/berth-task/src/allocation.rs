use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskResult;
use crate::id::{AllocationId, TaskId};
use crate::spec::LaunchSpec;

/// A slice of cluster resources granted to a task.
#[async_trait]
pub trait Allocation: Send + Sync + 'static {
    fn id(&self) -> AllocationId;
    async fn start(&self, spec: LaunchSpec) -> TaskResult<()>;
    async fn kill(&self) -> TaskResult<()>;
}

/// The resource manager's answer to an allocation request.
#[derive(Clone)]
pub struct ResourcesAllocated {
    pub id: TaskId,
    pub resource_pool: Option<String>,
    pub allocations: Vec<Arc<dyn Allocation>>,
}

impl fmt::Debug for ResourcesAllocated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcesAllocated")
            .field("id", &self.id)
            .field("resource_pool", &self.resource_pool)
            .field(
                "allocations",
                &self.allocations.iter().map(|x| x.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
