use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::TaskResult;
use crate::id::TaskId;

/// The credential a running task uses to call back into the cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskSession {
    task_id: TaskId,
    token: String,
}

impl TaskSession {
    pub fn new(task_id: TaskId, token: impl Into<String>) -> Self {
        Self {
            task_id,
            token: token.into(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for TaskSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSession")
            .field("task_id", &self.task_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn create_session(&self, task_id: &TaskId) -> TaskResult<TaskSession>;
    /// Deletes the session of the task. Deleting a missing session succeeds.
    async fn delete_session(&self, task_id: &TaskId) -> TaskResult<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<TaskId, TaskSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<TaskSession> {
        self.sessions.lock().await.get(task_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, task_id: &TaskId) -> TaskResult<TaskSession> {
        let session = TaskSession::new(task_id.clone(), Uuid::new_v4().simple().to_string());
        self.sessions
            .lock()
            .await
            .insert(task_id.clone(), session.clone());
        Ok(session)
    }

    async fn delete_session(&self, task_id: &TaskId) -> TaskResult<()> {
        self.sessions.lock().await.remove(task_id);
        Ok(())
    }
}
