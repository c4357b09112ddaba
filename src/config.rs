use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Log file the CLI appends to unless told otherwise.
pub const DEFAULT_LOG_FILE: &str = "cpu-test.log";

/// Validated parameters of one stress run.
///
/// Fields are public so callers can build a config directly; the orchestrator
/// calls [`RunConfig::validate`] again before it starts anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub cores_to_use: u32,
    pub load_percentage: u32,
    pub duration_seconds: u64,
}

impl RunConfig {
    /// Range-checks raw integers, as typed by an operator.
    pub fn new(cores: i64, load: i64, duration: i64) -> Result<Self, ConfigError> {
        let cores_to_use = u32::try_from(cores)
            .ok()
            .filter(|c| *c >= 1)
            .ok_or(ConfigError::Cores(cores))?;
        let load_percentage = u32::try_from(load)
            .ok()
            .filter(|l| (1..=100).contains(l))
            .ok_or(ConfigError::Load(load))?;
        let duration_seconds = u64::try_from(duration)
            .ok()
            .filter(|d| *d >= 1)
            .ok_or(ConfigError::Duration(duration))?;

        Ok(Self {
            cores_to_use,
            load_percentage,
            duration_seconds,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cores_to_use < 1 {
            return Err(ConfigError::Cores(i64::from(self.cores_to_use)));
        }
        if !(1..=100).contains(&self.load_percentage) {
            return Err(ConfigError::Load(i64::from(self.load_percentage)));
        }
        if self.duration_seconds < 1 {
            return Err(ConfigError::Duration(self.duration_seconds as i64));
        }
        Ok(())
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} process(es) at {}% for {}s",
            self.cores_to_use, self.load_percentage, self.duration_seconds
        )
    }
}

/// Length of one duty-cycle window, countdown tick and monitor poll.
///
/// Production runs use one second. Tests shrink the window so a run of a few
/// "seconds" finishes in milliseconds with the same busy/idle ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub window: Duration,
}

impl Pacing {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Wall-clock length of `seconds` paced seconds.
    pub fn span(&self, seconds: u64) -> Duration {
        self.window.saturating_mul(u32::try_from(seconds).unwrap_or(u32::MAX))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
        }
    }
}
