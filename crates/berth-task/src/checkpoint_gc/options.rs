use crate::checkpoint::CheckpointStorageConfig;
use crate::controller::{ControllerOptions, TaskServices};
use crate::id::TaskId;
use crate::spec::TaskSpec;

pub struct CheckpointGcOptions {
    pub task_id: TaskId,
    pub experiment_id: i32,
    pub storage: CheckpointStorageConfig,
    pub delete_tensorboards: bool,
    pub task_spec: TaskSpec,
    pub resource_pool: Option<String>,
    pub controller: ControllerOptions,
    pub services: TaskServices,
}

impl CheckpointGcOptions {
    pub fn new(
        experiment_id: i32,
        storage: CheckpointStorageConfig,
        controller: ControllerOptions,
        services: TaskServices,
    ) -> Self {
        Self {
            task_id: TaskId::random(),
            experiment_id,
            storage,
            delete_tensorboards: false,
            task_spec: TaskSpec::default(),
            resource_pool: None,
            controller,
            services,
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_task_spec(mut self, task_spec: TaskSpec) -> Self {
        self.task_spec = task_spec;
        self
    }

    pub fn with_resource_pool(mut self, resource_pool: impl Into<String>) -> Self {
        self.resource_pool = Some(resource_pool.into());
        self
    }

    pub fn with_delete_tensorboards(mut self, delete_tensorboards: bool) -> Self {
        self.delete_tensorboards = delete_tensorboards;
        self
    }
}
