use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::container::{Address, Container, ContainerState};
use crate::error::{TaskError, TaskResult};
use crate::id::TaskId;
use crate::lifecycle::TaskLifecycle;
use crate::proxy::ProxyProtocol;
use crate::readiness::{ReadinessCheck, ReadinessChecks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Command,
    Notebook,
    Shell,
    Tensorboard,
    CheckpointGc,
}

impl TaskKind {
    pub(crate) fn proxy_protocol(&self) -> Option<ProxyProtocol> {
        match self {
            TaskKind::Command | TaskKind::Notebook | TaskKind::Tensorboard => {
                Some(ProxyProtocol::Http)
            }
            TaskKind::Shell => Some(ProxyProtocol::Tcp),
            TaskKind::CheckpointGc => None,
        }
    }

    pub(crate) fn service_address(&self, prefix: &str, task_id: &TaskId) -> Option<String> {
        match self {
            TaskKind::Notebook | TaskKind::Tensorboard => {
                Some(format!("{}/{task_id}/", prefix.trim_end_matches('/')))
            }
            TaskKind::Command | TaskKind::Shell | TaskKind::CheckpointGc => None,
        }
    }

    pub(crate) fn default_readiness_checks(&self) -> TaskResult<ReadinessChecks> {
        let checks = ReadinessChecks::new();
        match self {
            TaskKind::Notebook => Ok(checks.with_check(
                "jupyter",
                ReadinessCheck::matches("Jupyter (Server|Notebook) .*is running at")?,
            )),
            TaskKind::Tensorboard => Ok(checks.with_check(
                "tensorboard",
                ReadinessCheck::matches("TensorBoard contains metrics")?,
            )),
            TaskKind::Command | TaskKind::Shell => Ok(checks),
            TaskKind::CheckpointGc => Err(TaskError::invalid(
                "checkpoint GC tasks do not have readiness checks",
            )),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Command => write!(f, "command"),
            TaskKind::Notebook => write!(f, "notebook"),
            TaskKind::Shell => write!(f, "shell"),
            TaskKind::Tensorboard => write!(f, "tensorboard"),
            TaskKind::CheckpointGc => write!(f, "checkpoint_gc"),
        }
    }
}

/// The status reported to users, derived from the lifecycle and the
/// latest container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Pulling,
    Starting,
    Running,
    Terminated,
}

impl From<ContainerState> for TaskStatus {
    fn from(state: ContainerState) -> Self {
        match state {
            ContainerState::Assigned => TaskStatus::Assigned,
            ContainerState::Pulling => TaskStatus::Pulling,
            ContainerState::Starting => TaskStatus::Starting,
            ContainerState::Running => TaskStatus::Running,
            ContainerState::Terminated => TaskStatus::Terminated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOwner {
    pub id: u32,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub state: TaskStatus,
    pub lifecycle: TaskLifecycle,
    pub container: Option<Container>,
    pub owner: Option<TaskOwner>,
    pub start_time: DateTime<Utc>,
    pub resource_pool: Option<String>,
    pub slots: usize,
    pub exit_status: Option<String>,
    pub service_address: Option<String>,
    pub addresses: Vec<Address>,
    pub ready: bool,
}
