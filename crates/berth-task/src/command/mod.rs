mod actor;
mod handler;
mod options;

pub use actor::CommandActor;
pub use options::CommandOptions;

use crate::controller::ControllerHandle;

/// The exit status of a command whose container exits without a failure.
pub(crate) const COMMAND_EXITED: &str = "command exited successfully";

pub type CommandHandle = ControllerHandle<CommandActor>;
