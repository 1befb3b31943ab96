use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("relay pin {pin} did not reach state {expected}")]
    RelayMismatch { pin: u8, expected: u8 },
    #[error("actuator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("event log CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("failed to {action} the machine: {source}")]
    Actuator {
        action: &'static str,
        #[source]
        source: ActuatorError,
    },
    #[error("failed to record {kind} event: {source}")]
    EventLog {
        kind: &'static str,
        #[source]
        source: EventLogError,
    },
    #[error("frame sink failed: {0}")]
    Sink(String),
}
