use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::Pacing;
use crate::deadline::{Deadline, StopSignal};
use crate::error::ProbeError;
use crate::probe::EnvironmentProbe;
use crate::reporter::Reporter;

/// Global usage at or above this raises the one-shot warning.
pub const WARN_THRESHOLD_PERCENT: f32 = 80.0;

/// Whether the high-usage warning has fired during the current run.
///
/// Owned by one run; a new run gets a fresh value.
#[derive(Debug, Default)]
pub struct WarningState {
    fired: AtomicBool,
}

impl WarningState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips false to true. Only the caller that performed the flip gets `true`.
    pub fn try_trip(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub samples: u64,
    pub error: Option<ProbeError>,
}

/// Polls system-wide CPU usage once per window until the deadline.
pub struct UsageMonitor {
    probe: Arc<dyn EnvironmentProbe>,
    reporter: Arc<dyn Reporter>,
    warning: Arc<WarningState>,
    pacing: Pacing,
}

impl UsageMonitor {
    pub fn new(
        probe: Arc<dyn EnvironmentProbe>,
        reporter: Arc<dyn Reporter>,
        warning: Arc<WarningState>,
        pacing: Pacing,
    ) -> Self {
        Self {
            probe,
            reporter,
            warning,
            pacing,
        }
    }

    /// A probe failure is reported once and ends monitoring; it never
    /// touches the load units.
    pub fn run(&self, deadline: Deadline, stop: &StopSignal) -> MonitorReport {
        let mut report = MonitorReport::default();

        while !deadline.has_passed() {
            match self.probe.cpu_utilization_percent() {
                Ok(usage) => {
                    report.samples += 1;
                    debug!(usage, "cpu sample");
                    if usage >= WARN_THRESHOLD_PERCENT && self.warning.try_trip() {
                        warn!(usage, "high global CPU usage");
                        self.reporter.warn(usage);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "cpu monitoring stopped");
                    self.reporter
                        .error(&format!("CPU monitoring stopped: {err}"));
                    report.error = Some(err);
                    break;
                }
            }

            let next = (Instant::now() + self.pacing.window).min(deadline.instant());
            if stop.wait_until(next) {
                break;
            }
        }

        report
    }
}
