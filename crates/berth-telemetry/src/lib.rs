pub mod common;
pub mod error;
mod logger;
pub mod telemetry;
