use crate::controller::{ControllerOptions, TaskServices};
use crate::error::{TaskError, TaskResult};
use crate::id::TaskId;
use crate::readiness::ReadinessChecks;
use crate::spec::{CommandConfig, FileBundle, TaskSpec};
use crate::summary::{TaskKind, TaskOwner};

/// Everything needed to run one command, notebook, shell or tensorboard task.
pub struct CommandOptions {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub owner: TaskOwner,
    pub config: CommandConfig,
    pub task_spec: TaskSpec,
    pub user_files: FileBundle,
    pub additional_files: FileBundle,
    pub readiness_checks: ReadinessChecks,
    pub controller: ControllerOptions,
    pub services: TaskServices,
}

impl CommandOptions {
    /// Creates the options with a random task ID and the default
    /// readiness checks of the task kind.
    pub fn try_new(
        kind: TaskKind,
        owner: TaskOwner,
        config: CommandConfig,
        controller: ControllerOptions,
        services: TaskServices,
    ) -> TaskResult<Self> {
        if kind == TaskKind::CheckpointGc {
            return Err(TaskError::invalid(
                "checkpoint GC tasks cannot run as commands",
            ));
        }
        Ok(Self {
            task_id: TaskId::random(),
            kind,
            owner,
            config,
            task_spec: TaskSpec::default(),
            user_files: FileBundle::default(),
            additional_files: FileBundle::default(),
            readiness_checks: kind.default_readiness_checks()?,
            controller,
            services,
        })
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_task_spec(mut self, task_spec: TaskSpec) -> Self {
        self.task_spec = task_spec;
        self
    }

    pub fn with_files(mut self, user_files: FileBundle, additional_files: FileBundle) -> Self {
        self.user_files = user_files;
        self.additional_files = additional_files;
        self
    }

    pub fn with_readiness_checks(mut self, readiness_checks: ReadinessChecks) -> Self {
        self.readiness_checks = readiness_checks;
        self
    }
}
