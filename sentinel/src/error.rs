use thiserror::Error;

/// Problems detected while building the watch configuration. Always fatal and
/// always surfaced before the poll loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid command wildcard {pattern:?}: {source}")]
    Wildcard {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid command regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("poll interval must be a positive number of seconds, got {0}")]
    Interval(f64),
    #[error("{backend} backend requires {what}")]
    MissingSetting {
        backend: &'static str,
        what: &'static str,
    },
    #[error("{backend} backend: {reason}")]
    InvalidSetting {
        backend: &'static str,
        reason: String,
    },
    #[error("{backend} backend is unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}

/// The requested PID is not present in the process table.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no process with PID {pid}")]
pub struct ProcessNotFound {
    pub pid: u32,
}

/// A liveness check could not be completed. This is not evidence that the
/// process ended.
#[derive(Debug, Error)]
#[error("failed to check process {pid}: {reason}")]
pub struct LivenessError {
    pub pid: u32,
    pub reason: String,
}

/// A single backend failed to deliver a notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
