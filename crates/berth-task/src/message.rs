use std::borrow::Cow;

use berth_telemetry::common::{SpanAssociation, SpanAttribute};
use tokio::sync::oneshot;

use crate::allocation::ResourcesAllocated;
use crate::checkpoint::CheckpointRecord;
use crate::container::ContainerStateChanged;
use crate::error::TaskResult;
use crate::event::{EventSubscription, TaskEvent};
use crate::id::{AllocationId, TaskId};
use crate::lifecycle::TaskOperation;
use crate::log::ContainerLog;
use crate::session::TaskSession;
use crate::summary::TaskSummary;

/// The messages handled by task controllers.
/// The variants after [`TaskMessage::Log`] are only sent by the controller
/// to itself when its background work completes.
pub enum TaskMessage {
    RequestStatusSnapshot {
        user_filter: Option<String>,
        result: oneshot::Sender<Option<TaskSummary>>,
    },
    GetEvents {
        result: oneshot::Sender<Vec<TaskEvent>>,
    },
    SubscribeEvents {
        result: oneshot::Sender<EventSubscription>,
    },
    Kill,
    ResourcesAllocated(ResourcesAllocated),
    ReleaseResources,
    ContainerStateChanged(ContainerStateChanged),
    Log(ContainerLog),
    AllocationRequestFailed {
        message: String,
    },
    SessionOpened {
        task_id: TaskId,
        result: TaskResult<TaskSession>,
    },
    CheckpointsListed {
        task_id: TaskId,
        result: TaskResult<Vec<CheckpointRecord>>,
    },
    ContainerStartFailed {
        allocation_id: AllocationId,
        message: String,
    },
    KillFailed {
        message: String,
    },
    CleanupCompleted,
    TerminateForGc,
}

impl TaskMessage {
    pub(crate) fn operation(&self) -> TaskOperation {
        match self {
            TaskMessage::RequestStatusSnapshot { .. }
            | TaskMessage::GetEvents { .. }
            | TaskMessage::SubscribeEvents { .. } => TaskOperation::Observe,
            TaskMessage::Kill => TaskOperation::Kill,
            TaskMessage::ResourcesAllocated(_) => TaskOperation::ResourcesAllocated,
            TaskMessage::ReleaseResources => TaskOperation::ReleaseResources,
            TaskMessage::ContainerStateChanged(_) => TaskOperation::ContainerStateChanged,
            TaskMessage::Log(_) => TaskOperation::Log,
            TaskMessage::AllocationRequestFailed { .. } => TaskOperation::AllocationRequestFailed,
            TaskMessage::SessionOpened { .. } => TaskOperation::SessionOpened,
            TaskMessage::CheckpointsListed { .. } => TaskOperation::CheckpointsListed,
            TaskMessage::ContainerStartFailed { .. } => TaskOperation::ContainerStartFailed,
            TaskMessage::KillFailed { .. } => TaskOperation::KillFailed,
            TaskMessage::CleanupCompleted => TaskOperation::CleanupCompleted,
            TaskMessage::TerminateForGc => TaskOperation::TerminateForGc,
        }
    }
}

impl SpanAssociation for TaskMessage {
    fn name(&self) -> Cow<'static, str> {
        let name = match self {
            TaskMessage::RequestStatusSnapshot { .. } => "RequestStatusSnapshot",
            TaskMessage::GetEvents { .. } => "GetEvents",
            TaskMessage::SubscribeEvents { .. } => "SubscribeEvents",
            TaskMessage::Kill => "Kill",
            TaskMessage::ResourcesAllocated(_) => "ResourcesAllocated",
            TaskMessage::ReleaseResources => "ReleaseResources",
            TaskMessage::ContainerStateChanged(_) => "ContainerStateChanged",
            TaskMessage::Log(_) => "Log",
            TaskMessage::AllocationRequestFailed { .. } => "AllocationRequestFailed",
            TaskMessage::SessionOpened { .. } => "SessionOpened",
            TaskMessage::CheckpointsListed { .. } => "CheckpointsListed",
            TaskMessage::ContainerStartFailed { .. } => "ContainerStartFailed",
            TaskMessage::KillFailed { .. } => "KillFailed",
            TaskMessage::CleanupCompleted => "CleanupCompleted",
            TaskMessage::TerminateForGc => "TerminateForGc",
        };
        name.into()
    }

    fn properties(&self) -> impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)> {
        let mut p: Vec<(Cow<'static, str>, Cow<'static, str>)> = vec![];
        match self {
            TaskMessage::RequestStatusSnapshot {
                user_filter: Some(user),
                ..
            } => {
                p.push((SpanAttribute::TASK_USER_FILTER.into(), user.clone().into()));
            }
            TaskMessage::ResourcesAllocated(allocated) => {
                p.push((SpanAttribute::TASK_ID.into(), allocated.id.to_string().into()));
                p.push((
                    SpanAttribute::ALLOCATION_COUNT.into(),
                    allocated.allocations.len().to_string().into(),
                ));
            }
            TaskMessage::ContainerStateChanged(change) => {
                p.push((
                    SpanAttribute::CONTAINER_ID.into(),
                    change.container.id.to_string().into(),
                ));
                p.push((
                    SpanAttribute::CONTAINER_STATE.into(),
                    change.container.state.to_string().into(),
                ));
                if let Some(failure) = change.stopped.as_ref().and_then(|x| x.failure.as_ref()) {
                    p.push((
                        SpanAttribute::CONTAINER_FAILURE.into(),
                        failure.to_string().into(),
                    ));
                }
            }
            TaskMessage::Log(log) => {
                if let Some(id) = &log.container_id {
                    p.push((SpanAttribute::CONTAINER_ID.into(), id.to_string().into()));
                }
            }
            TaskMessage::SessionOpened { task_id, .. }
            | TaskMessage::CheckpointsListed { task_id, .. } => {
                p.push((SpanAttribute::TASK_ID.into(), task_id.to_string().into()));
            }
            TaskMessage::ContainerStartFailed {
                allocation_id,
                message,
            } => {
                p.push((
                    SpanAttribute::ALLOCATION_ID.into(),
                    allocation_id.to_string().into(),
                ));
                p.push((SpanAttribute::EXCEPTION_MESSAGE.into(), message.clone().into()));
            }
            TaskMessage::AllocationRequestFailed { message }
            | TaskMessage::KillFailed { message } => {
                p.push((SpanAttribute::EXCEPTION_MESSAGE.into(), message.clone().into()));
            }
            TaskMessage::RequestStatusSnapshot {
                user_filter: None, ..
            }
            | TaskMessage::GetEvents { .. }
            | TaskMessage::SubscribeEvents { .. }
            | TaskMessage::Kill
            | TaskMessage::ReleaseResources
            | TaskMessage::CleanupCompleted
            | TaskMessage::TerminateForGc => {}
        }
        p
    }
}
