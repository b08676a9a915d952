use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ContainerId;

/// The container states reported by the runtime, in the order they progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    Assigned,
    Pulling,
    Starting,
    Running,
    Terminated,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Assigned => write!(f, "ASSIGNED"),
            ContainerState::Pulling => write!(f, "PULLING"),
            ContainerState::Starting => write!(f, "STARTING"),
            ContainerState::Running => write!(f, "RUNNING"),
            ContainerState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub state: ContainerState,
}

/// A network address exposed by a running container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub container_ip: String,
    pub container_port: u16,
    pub host_ip: String,
    pub host_port: u16,
}

impl Address {
    /// Creates an address where the container port is published on the same host port.
    pub fn new(host_ip: impl Into<String>, port: u16) -> Self {
        let host_ip = host_ip.into();
        Self {
            container_ip: host_ip.clone(),
            container_port: port,
            host_ip,
            host_port: port,
        }
    }

    pub fn host_address(&self) -> String {
        format!("{}:{}", self.host_ip, self.host_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFailure {
    pub message: String,
    pub exit_code: Option<i32>,
}

impl ContainerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

impl fmt::Display for ContainerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStarted {
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStopped {
    pub failure: Option<ContainerFailure>,
}

/// A container state notification pushed by the runtime.
///
/// `started` accompanies the [`ContainerState::Running`] transition
/// and `stopped` accompanies the [`ContainerState::Terminated`] transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStateChanged {
    pub container: Container,
    pub started: Option<ContainerStarted>,
    pub stopped: Option<ContainerStopped>,
}

impl ContainerStateChanged {
    pub fn new(id: impl Into<ContainerId>, state: ContainerState) -> Self {
        Self {
            container: Container {
                id: id.into(),
                state,
            },
            started: None,
            stopped: None,
        }
    }

    pub fn running(id: impl Into<ContainerId>, addresses: Vec<Address>) -> Self {
        Self {
            started: Some(ContainerStarted { addresses }),
            ..Self::new(id, ContainerState::Running)
        }
    }

    pub fn terminated(id: impl Into<ContainerId>, failure: Option<ContainerFailure>) -> Self {
        Self {
            stopped: Some(ContainerStopped { failure }),
            ..Self::new(id, ContainerState::Terminated)
        }
    }
}
