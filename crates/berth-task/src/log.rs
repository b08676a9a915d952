use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ContainerId;

/// A log line emitted by a task container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLog {
    pub container_id: Option<ContainerId>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ContainerLog {
    pub fn new(container_id: Option<ContainerId>, message: impl Into<String>) -> Self {
        Self {
            container_id,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ContainerLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        match &self.container_id {
            Some(id) => write!(f, "[{timestamp}] [{id}] {}", self.message),
            None => write!(f, "[{timestamp}] {}", self.message),
        }
    }
}

/// Keeps the most recent log lines of a task, evicting the oldest lines
/// once the capacity is reached.
#[derive(Debug)]
pub(crate) struct LogBuffer {
    lines: VecDeque<ContainerLog>,
    capacity: usize,
    evicted: usize,
}

impl LogBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    pub(crate) fn push(&mut self, log: ContainerLog) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.lines.push_back(log);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ContainerLog> {
        self.lines.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    /// The number of lines that no longer fit in the buffer.
    pub(crate) fn evicted(&self) -> usize {
        self.evicted
    }
}
