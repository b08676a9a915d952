use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::container::Address;
use crate::log::ContainerLog;
use crate::summary::TaskSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventKind {
    Scheduled,
    Assigned { allocations: usize },
    ContainerStarted { addresses: Vec<Address> },
    ServiceReady { log: ContainerLog },
    Log { log: ContainerLog },
    TerminateRequested,
    Exited { exit_status: String },
}

/// A lifecycle event with the task summary taken right after the change.
/// Consecutive events with an unchanged summary share one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub seq: u64,
    pub time: DateTime<Utc>,
    pub snapshot: Arc<TaskSummary>,
    #[serde(flatten)]
    pub kind: TaskEventKind,
}

/// The history at subscription time followed by the live events.
/// No event is missed or repeated between the two.
pub struct EventSubscription {
    pub history: Vec<TaskEvent>,
    pub receiver: broadcast::Receiver<TaskEvent>,
}

/// The ordered, append-only event log of one task.
pub(crate) struct EventStream {
    history: Vec<TaskEvent>,
    sender: broadcast::Sender<TaskEvent>,
}

impl EventStream {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            history: vec![],
            sender,
        }
    }

    pub(crate) fn publish(&mut self, snapshot: TaskSummary, kind: TaskEventKind) {
        let snapshot = match self.history.last() {
            Some(last) if *last.snapshot == snapshot => Arc::clone(&last.snapshot),
            _ => Arc::new(snapshot),
        };
        let event = TaskEvent {
            seq: self.history.len() as u64,
            time: Utc::now(),
            snapshot,
            kind,
        };
        // An error only means that there is no live subscriber.
        let _ = self.sender.send(event.clone());
        self.history.push(event);
    }

    pub(crate) fn history(&self) -> &[TaskEvent] {
        &self.history
    }

    pub(crate) fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            history: self.history.clone(),
            receiver: self.sender.subscribe(),
        }
    }
}
