use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub checkpoint_gc: CheckpointGcConfig,
    pub proxy: ProxyConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads the built-in defaults, overridden by `BERTH__`-prefixed environment variables.
    /// A double underscore separates nested keys, e.g. `BERTH__CONTROLLER__LOG_BUFFER_SIZE`.
    pub fn load() -> CommonResult<Self> {
        let config: Self = Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed("BERTH__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CommonResult<()> {
        if self.controller.log_buffer_size == 0 {
            return Err(CommonError::invalid("controller.log_buffer_size must be positive"));
        }
        if self.controller.event_channel_capacity == 0 {
            return Err(CommonError::invalid(
                "controller.event_channel_capacity must be positive",
            ));
        }
        if self.checkpoint_gc.log_buffer_size == 0 {
            return Err(CommonError::invalid(
                "checkpoint_gc.log_buffer_size must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub terminated_retention_secs: u64,
    pub log_buffer_size: usize,
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointGcConfig {
    pub log_buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub path_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub export_spans: bool,
}
