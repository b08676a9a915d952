use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointRecord, CheckpointStorageConfig};
use crate::id::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUserGroup {
    pub user_id: u32,
    pub user: String,
    pub group_id: u32,
    pub group: String,
}

/// The cluster-wide settings shared by every container launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub cluster_id: String,
    pub environment: BTreeMap<String, String>,
    pub agent_user_group: Option<AgentUserGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub slots: usize,
    pub agent_label: Option<String>,
    pub resource_pool: Option<String>,
    pub priority: Option<i32>,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            slots: 1,
            agent_label: None,
            resource_pool: None,
            priority: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub description: String,
    pub entrypoint: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

/// A set of files copied into the container before it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBundle {
    pub items: Vec<FileItem>,
}

impl FileBundle {
    pub fn new(items: Vec<FileItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.items.iter().map(|x| x.content.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPayload {
    StartCommand {
        config: CommandConfig,
        user_files: FileBundle,
        additional_files: FileBundle,
    },
    GcCheckpoints {
        experiment_id: i32,
        storage: CheckpointStorageConfig,
        to_delete: Vec<CheckpointRecord>,
        delete_tensorboards: bool,
    },
}

/// Everything a container needs to start.
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub task_id: TaskId,
    pub task_token: String,
    pub base: TaskSpec,
    pub payload: TaskPayload,
}

impl std::fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("task_id", &self.task_id)
            .field("task_token", &"<redacted>")
            .field("base", &self.base)
            .field("payload", &self.payload)
            .finish()
    }
}
