mod core;
mod handle;
mod options;
mod services;

pub(crate) use self::core::{
    AllocationCount, TaskCore, ABORTED_BEFORE_SCHEDULING, KILLED_BEFORE_START,
};
pub use handle::ControllerHandle;
pub use options::ControllerOptions;
pub use services::TaskServices;
