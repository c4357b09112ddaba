use std::io;

use thiserror::Error;

/// Rejected run parameters. Nothing is started when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of cores must be at least 1, got {0}")]
    Cores(i64),

    #[error("CPU load percentage must be between 1 and 100, got {0}")]
    Load(i64),

    #[error("duration must be at least 1 second, got {0}")]
    Duration(i64),

    #[error("invalid input for {field}: {input:?} is not a number")]
    NotANumber { field: &'static str, input: String },
}

/// The environment could not answer a processor or utilization query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("CPU statistics are not supported on this platform")]
    Unsupported,

    #[error("no processors reported by the system")]
    NoProcessors,

    #[error("CPU usage query failed: {0}")]
    Query(String),
}

#[derive(Debug, Error)]
pub enum StressError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("environment probe failed: {0}")]
    Environment(#[from] ProbeError),

    #[error("failed to start load worker {index}: {source}")]
    WorkerStart {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to start {name}: {source}")]
    Activity {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

impl StressError {
    /// Errors raised after the run started. These were already passed to the
    /// run's `Reporter`.
    pub fn is_run_abort(&self) -> bool {
        matches!(self, StressError::WorkerStart { .. } | StressError::Activity { .. })
    }
}
