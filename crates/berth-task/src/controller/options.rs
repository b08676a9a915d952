use std::time::Duration;

use berth_common::config::AppConfig;

#[readonly::make]
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// How long a terminated task stays observable before it is garbage collected.
    pub terminated_retention: Duration,
    pub log_buffer_size: usize,
    pub event_channel_capacity: usize,
    pub proxy_path_prefix: String,
}

impl ControllerOptions {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            terminated_retention: Duration::from_secs(config.controller.terminated_retention_secs),
            log_buffer_size: config.controller.log_buffer_size,
            event_channel_capacity: config.controller.event_channel_capacity,
            proxy_path_prefix: config.proxy.path_prefix.clone(),
        }
    }

    /// Checkpoint GC tasks keep more log lines
    /// since the buffer is reported when the deletion fails.
    pub fn for_checkpoint_gc(config: &AppConfig) -> Self {
        Self {
            log_buffer_size: config.checkpoint_gc.log_buffer_size,
            ..Self::new(config)
        }
    }
}
