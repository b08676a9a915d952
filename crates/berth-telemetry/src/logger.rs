use fastrace::local::LocalSpan;
use fastrace::Event;
use log::{Log, Metadata, Record};

/// Forwards each record to the primary logger, and to every secondary logger
/// when the primary logger accepts the record.
pub(crate) struct FanOutLogger {
    primary: Box<dyn Log>,
    secondary: Vec<Box<dyn Log>>,
}

impl FanOutLogger {
    pub(crate) fn new(primary: Box<dyn Log>, secondary: Vec<Box<dyn Log>>) -> Self {
        Self { primary, secondary }
    }
}

impl Log for FanOutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.primary.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.primary.enabled(record.metadata()) {
            return;
        }
        self.primary.log(record);
        self.secondary.iter().for_each(|logger| logger.log(record));
    }

    fn flush(&self) {
        self.primary.flush();
        self.secondary.iter().for_each(|logger| logger.flush());
    }
}

/// Attaches log records to the current local span as span events,
/// so that controller logs show up next to the message that produced them.
pub(crate) struct SpanEventLogger;

impl Log for SpanEventLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let event = Event::new(record.level().as_str()).with_properties(|| {
            [
                ("target", record.target().to_string()),
                ("message", record.args().to_string()),
            ]
        });
        LocalSpan::add_event(event);
    }

    fn flush(&self) {}
}
