mod actor;
mod handler;
mod options;
#[cfg(test)]
mod tests;

pub use actor::CheckpointGcActor;
pub use options::CheckpointGcOptions;

use crate::controller::ControllerHandle;

pub(crate) const GC_COMPLETED: &str = "checkpoint garbage collection completed";

pub type CheckpointGcHandle = ControllerHandle<CheckpointGcActor>;
