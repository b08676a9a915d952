use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TaskResult;

/// How many checkpoints an experiment keeps after garbage collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStorageConfig {
    pub storage_path: String,
    pub save_experiment_best: usize,
    pub save_trial_best: usize,
    pub save_trial_latest: usize,
}

impl Default for CheckpointStorageConfig {
    fn default() -> Self {
        Self {
            storage_path: String::new(),
            save_experiment_best: 0,
            save_trial_best: 1,
            save_trial_latest: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub uuid: String,
    pub trial_id: i32,
    pub total_batches: u64,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    /// Returns the checkpoints of the experiment that the storage policy no longer retains.
    async fn checkpoints_to_gc(
        &self,
        experiment_id: i32,
        storage: &CheckpointStorageConfig,
    ) -> TaskResult<Vec<CheckpointRecord>>;
}

/// A checkpoint with its validation metric, where a smaller metric is better.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    pub record: CheckpointRecord,
    pub metric: Option<f64>,
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    experiments: Mutex<BTreeMap<i32, Vec<StoredCheckpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, experiment_id: i32, checkpoint: StoredCheckpoint) {
        self.experiments
            .lock()
            .await
            .entry(experiment_id)
            .or_default()
            .push(checkpoint);
    }
}

fn by_metric(a: &&StoredCheckpoint, b: &&StoredCheckpoint) -> Ordering {
    match (a.metric, b.metric) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn retained(
    checkpoints: &[StoredCheckpoint],
    storage: &CheckpointStorageConfig,
) -> HashSet<String> {
    let mut keep = HashSet::new();
    let mut ranked = checkpoints
        .iter()
        .filter(|x| x.metric.is_some())
        .collect::<Vec<_>>();
    ranked.sort_by(by_metric);
    keep.extend(
        ranked
            .iter()
            .take(storage.save_experiment_best)
            .map(|x| x.record.uuid.clone()),
    );
    let mut trials = BTreeMap::<i32, Vec<&StoredCheckpoint>>::new();
    for checkpoint in checkpoints {
        trials
            .entry(checkpoint.record.trial_id)
            .or_default()
            .push(checkpoint);
    }
    for mut trial in trials.into_values() {
        trial.sort_by(|a, b| b.record.total_batches.cmp(&a.record.total_batches));
        keep.extend(
            trial
                .iter()
                .take(storage.save_trial_latest)
                .map(|x| x.record.uuid.clone()),
        );
        let mut best = trial
            .into_iter()
            .filter(|x| x.metric.is_some())
            .collect::<Vec<_>>();
        best.sort_by(by_metric);
        keep.extend(
            best.iter()
                .take(storage.save_trial_best)
                .map(|x| x.record.uuid.clone()),
        );
    }
    keep
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn checkpoints_to_gc(
        &self,
        experiment_id: i32,
        storage: &CheckpointStorageConfig,
    ) -> TaskResult<Vec<CheckpointRecord>> {
        let experiments = self.experiments.lock().await;
        let Some(checkpoints) = experiments.get(&experiment_id) else {
            return Ok(vec![]);
        };
        let keep = retained(checkpoints, storage);
        Ok(checkpoints
            .iter()
            .filter(|x| !keep.contains(&x.record.uuid))
            .map(|x| x.record.clone())
            .collect())
    }
}
