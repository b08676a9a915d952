use std::fmt;

use serde::Serialize;

/// The coarse lifecycle of a task. It only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskLifecycle {
    AwaitingAllocation,
    Allocated,
    Running,
    Terminated,
    GarbageCollected,
}

impl TaskLifecycle {
    pub fn can_transition_to(&self, next: TaskLifecycle) -> bool {
        match (self, next) {
            (TaskLifecycle::AwaitingAllocation, TaskLifecycle::Allocated)
            | (TaskLifecycle::AwaitingAllocation, TaskLifecycle::Terminated)
            | (TaskLifecycle::Allocated, TaskLifecycle::Running)
            | (TaskLifecycle::Allocated, TaskLifecycle::Terminated)
            | (TaskLifecycle::Running, TaskLifecycle::Terminated)
            | (TaskLifecycle::Terminated, TaskLifecycle::GarbageCollected) => true,
            _ => false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            TaskLifecycle::Terminated | TaskLifecycle::GarbageCollected
        )
    }
}

impl fmt::Display for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskLifecycle::AwaitingAllocation => write!(f, "awaiting allocation"),
            TaskLifecycle::Allocated => write!(f, "allocated"),
            TaskLifecycle::Running => write!(f, "running"),
            TaskLifecycle::Terminated => write!(f, "terminated"),
            TaskLifecycle::GarbageCollected => write!(f, "garbage collected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskOperation {
    Observe,
    Kill,
    ResourcesAllocated,
    ReleaseResources,
    ContainerStateChanged,
    Log,
    AllocationRequestFailed,
    SessionOpened,
    CheckpointsListed,
    ContainerStartFailed,
    KillFailed,
    CleanupCompleted,
    TerminateForGc,
}

impl fmt::Display for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskOperation::Observe => "observe",
            TaskOperation::Kill => "kill",
            TaskOperation::ResourcesAllocated => "resources allocated",
            TaskOperation::ReleaseResources => "release resources",
            TaskOperation::ContainerStateChanged => "container state changed",
            TaskOperation::Log => "log",
            TaskOperation::AllocationRequestFailed => "allocation request failed",
            TaskOperation::SessionOpened => "session opened",
            TaskOperation::CheckpointsListed => "checkpoints listed",
            TaskOperation::ContainerStartFailed => "container start failed",
            TaskOperation::KillFailed => "kill failed",
            TaskOperation::CleanupCompleted => "cleanup completed",
            TaskOperation::TerminateForGc => "terminate for GC",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControllerKind {
    Command,
    CheckpointGc,
}

impl ControllerKind {
    /// Whether the controller handles the operation in the lifecycle state.
    ///
    /// Operations that race with the lifecycle (kills, stale allocations,
    /// late container reports and logs) are accepted in every state where
    /// they can arrive, and the handlers turn them into no-ops.
    /// The remaining pairs are rejected as unexpected.
    pub(crate) fn accepts(&self, lifecycle: TaskLifecycle, operation: TaskOperation) -> bool {
        use TaskLifecycle as L;
        use TaskOperation as O;

        match operation {
            O::Observe | O::Kill | O::ResourcesAllocated | O::ReleaseResources => true,
            O::ContainerStateChanged | O::Log => {
                matches!(lifecycle, L::Allocated | L::Running | L::Terminated)
            }
            O::AllocationRequestFailed => true,
            O::SessionOpened | O::ContainerStartFailed | O::KillFailed => {
                matches!(lifecycle, L::Allocated | L::Running | L::Terminated)
            }
            O::CheckpointsListed => {
                matches!(self, ControllerKind::CheckpointGc)
                    && matches!(lifecycle, L::Allocated | L::Terminated)
            }
            O::CleanupCompleted | O::TerminateForGc => matches!(lifecycle, L::Terminated),
        }
    }
}
