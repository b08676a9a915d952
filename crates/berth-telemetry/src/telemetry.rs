use std::io::Write;
use std::sync::Mutex;

use berth_common::config::TelemetryConfig;
use fastrace::collector::{Config, ConsoleReporter, Reporter, SpanRecord};
use log::{debug, Log};

use crate::error::{TelemetryError, TelemetryResult};
use crate::logger::{FanOutLogger, SpanEventLogger};

enum TelemetryStatus {
    Uninitialized,
    Initialized,
    Failed,
}

static TELEMETRY_STATUS: Mutex<TelemetryStatus> = Mutex::new(TelemetryStatus::Uninitialized);

pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    let mut status = TELEMETRY_STATUS
        .lock()
        .map_err(|e| TelemetryError::internal(e.to_string()))?;

    match *status {
        TelemetryStatus::Uninitialized => {
            init_spans(config);
            match init_logs(config) {
                Ok(()) => {
                    debug!("telemetry initialized");
                    *status = TelemetryStatus::Initialized;
                    Ok(())
                }
                Err(e) => {
                    *status = TelemetryStatus::Failed;
                    Err(e)
                }
            }
        }
        TelemetryStatus::Initialized => {
            Err(TelemetryError::internal("telemetry already initialized"))
        }
        TelemetryStatus::Failed => Err(TelemetryError::internal(
            "telemetry failed to initialize previously",
        )),
    }
}

fn init_spans(config: &TelemetryConfig) {
    if config.export_spans {
        fastrace::set_reporter(ConsoleReporter, Config::default());
    } else {
        fastrace::set_reporter(NoOpReporter, Config::default());
    }
}

fn init_logs(config: &TelemetryConfig) -> TelemetryResult<()> {
    let primary = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .format(move |buf, record| {
        let level = record.level();
        let target = record.target();
        let style = buf.default_level_style(level);
        let timestamp = buf.timestamp();
        let args = record.args();
        writeln!(buf, "[{timestamp} {style}{level}{style:#} {target}] {args}")
    })
    .build();
    let max_level = primary.filter();

    let mut secondary: Vec<Box<dyn Log>> = vec![];
    if config.export_spans {
        secondary.push(Box::new(SpanEventLogger));
    }

    log::set_boxed_logger(Box::new(FanOutLogger::new(Box::new(primary), secondary)))
        .map_err(|e| TelemetryError::internal(e.to_string()))?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn shutdown_telemetry() {
    debug!("flushing spans");
    fastrace::flush();
}

/// A span reporter that discards all spans.
struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&mut self, _spans: Vec<SpanRecord>) {}
}
