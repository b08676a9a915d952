mod allocation;
mod checkpoint;
pub mod checkpoint_gc;
pub mod command;
mod container;
mod controller;
pub mod error;
mod event;
mod id;
mod lifecycle;
mod log;
mod message;
mod proxy;
mod readiness;
mod resource_manager;
mod session;
mod spec;
mod summary;
#[cfg(test)]
mod testing;

pub use allocation::{Allocation, ResourcesAllocated};
pub use checkpoint::{
    CheckpointRecord, CheckpointStorageConfig, CheckpointStore, MemoryCheckpointStore,
    StoredCheckpoint,
};
pub use container::{
    Address, Container, ContainerFailure, ContainerStarted, ContainerState,
    ContainerStateChanged, ContainerStopped,
};
pub use controller::{ControllerHandle, ControllerOptions, TaskServices};
pub use event::{EventSubscription, TaskEvent, TaskEventKind};
pub use id::{AllocationId, ContainerId, TaskId};
pub use lifecycle::TaskLifecycle;
pub use log::ContainerLog;
pub use message::TaskMessage;
pub use proxy::{MemoryProxyRegistry, ProxyProtocol, ProxyRegistrar, ProxyRegistration};
pub use readiness::{ReadinessCheck, ReadinessChecks};
pub use resource_manager::{FittingRequirements, ResourceManager, ResourceShape, TaskHandler, TaskRequest};
pub use session::{MemorySessionStore, SessionStore, TaskSession};
pub use spec::{
    AgentUserGroup, CommandConfig, FileBundle, FileItem, LaunchSpec, ResourcesConfig, TaskPayload,
    TaskSpec,
};
pub use summary::{TaskKind, TaskOwner, TaskStatus, TaskSummary};
