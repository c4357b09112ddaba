use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Pacing, RunConfig};
use crate::countdown::Countdown;
use crate::cpu_stress::DutyCycle;
use crate::deadline::{Deadline, StopSignal};
use crate::error::{ProbeError, StressError};
use crate::monitor::{MonitorReport, UsageMonitor, WarningState};
use crate::probe::EnvironmentProbe;
use crate::reporter::Reporter;
use crate::worker::{Worker, WorkerExit, WorkerSpawner};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub approx_global_load: f64,
    pub workers: u32,
    /// Units that died before the deadline. They never stop the others.
    pub crashed_workers: u32,
    pub warning_fired: bool,
    pub monitor_error: Option<ProbeError>,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} worker(s), approx. global load {:.1}%, high usage warning: {}",
            self.workers,
            self.approx_global_load,
            if self.warning_fired { "yes" } else { "no" }
        )?;
        if self.crashed_workers > 0 {
            write!(f, ", {} worker(s) crashed", self.crashed_workers)?;
        }
        Ok(())
    }
}

/// Estimated share of the whole machine the run will occupy, capped at 100.
///
/// Oversubscribed runs (`cores > logical_threads`) only cap the estimate; the
/// requested number of workers is still started.
pub fn approx_global_load(cores: u32, load_percentage: u32, logical_threads: usize) -> f64 {
    if logical_threads == 0 {
        return 100.0;
    }
    let busy_cores = f64::from(cores) * f64::from(load_percentage) / 100.0;
    (busy_cores / logical_threads as f64 * 100.0).min(100.0)
}

/// Ties load units, the usage monitor and the countdown to one deadline.
pub struct StressOrchestrator {
    probe: Arc<dyn EnvironmentProbe>,
    reporter: Arc<dyn Reporter>,
    spawner: Box<dyn WorkerSpawner>,
    pacing: Pacing,
}

impl StressOrchestrator {
    pub fn new(
        probe: Arc<dyn EnvironmentProbe>,
        reporter: Arc<dyn Reporter>,
        spawner: Box<dyn WorkerSpawner>,
    ) -> Self {
        Self {
            probe,
            reporter,
            spawner,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn execute(&self, config: &RunConfig) -> Result<RunSummary, StressError> {
        config.validate()?;

        let logical_threads = self.probe.logical_processor_count()?;
        let approx = approx_global_load(config.cores_to_use, config.load_percentage, logical_threads);
        if config.cores_to_use as usize > logical_threads {
            warn!(
                cores = config.cores_to_use,
                logical_threads, "more load units than logical processors"
            );
        }

        self.reporter.banner(&banner_text(config, approx));
        info!(%config, approx_global_load = approx, "stress test starting");

        let warning = Arc::new(WarningState::new());
        let stop = StopSignal::new();
        let start = Instant::now();
        let deadline = Deadline::starting_at(start, self.pacing.span(config.duration_seconds));
        let cycle = DutyCycle::new(config.load_percentage, self.pacing.window);

        let monitor = UsageMonitor::new(
            self.probe.clone(),
            self.reporter.clone(),
            warning.clone(),
            self.pacing,
        );
        let countdown = Countdown::new(self.reporter.clone(), self.pacing);

        let outcome = thread::scope(|s| {
            let monitor_handle = thread::Builder::new()
                .name("usage-monitor".into())
                .spawn_scoped(s, || monitor.run(deadline, &stop))
                .map_err(|source| StressError::Activity {
                    name: "usage monitor",
                    source,
                })?;

            let countdown_handle = thread::Builder::new()
                .name("countdown".into())
                .spawn_scoped(s, || countdown.run(start, config.duration_seconds, &stop));
            let countdown_handle = match countdown_handle {
                Ok(handle) => handle,
                Err(source) => {
                    stop.cancel();
                    return Err(StressError::Activity {
                        name: "countdown",
                        source,
                    });
                }
            };

            let workers = self.spawn_workers(config.cores_to_use, cycle, deadline, &stop)?;
            let crashed = join_workers(workers);

            let monitor_report = monitor_handle.join().unwrap_or_else(|_| MonitorReport {
                error: Some(ProbeError::Query("usage monitor panicked".into())),
                ..MonitorReport::default()
            });
            if countdown_handle.join().is_err() {
                warn!("countdown thread panicked");
            }
            Ok((crashed, monitor_report))
        });
        let (crashed, monitor_report) = match outcome {
            Ok(joined) => joined,
            Err(err) => {
                self.reporter.error(&format!("stress test aborted: {err}"));
                return Err(err);
            }
        };

        let summary = RunSummary {
            approx_global_load: approx,
            workers: config.cores_to_use,
            crashed_workers: crashed,
            warning_fired: warning.fired(),
            monitor_error: monitor_report.error,
            elapsed: start.elapsed(),
        };
        info!(
            elapsed_ms = summary.elapsed.as_millis() as u64,
            samples = monitor_report.samples,
            warning = summary.warning_fired,
            crashed = summary.crashed_workers,
            "stress test finished"
        );
        self.reporter.done(&summary);
        Ok(summary)
    }

    /// All or nothing: on the first spawn failure every started unit and the
    /// background activities are cancelled and reaped before the error returns.
    fn spawn_workers(
        &self,
        count: u32,
        cycle: DutyCycle,
        deadline: Deadline,
        stop: &StopSignal,
    ) -> Result<Vec<Box<dyn Worker>>, StressError> {
        let mut workers: Vec<Box<dyn Worker>> = Vec::new();
        for index in 0..count as usize {
            match self.spawner.spawn(index, cycle, deadline, stop) {
                Ok(worker) => {
                    debug!(worker = index, "load unit started");
                    workers.push(worker);
                }
                Err(source) => {
                    warn!(worker = index, error = %source, "aborting run, load unit failed to start");
                    stop.cancel();
                    for worker in &mut workers {
                        worker.cancel();
                    }
                    join_workers(workers);
                    return Err(StressError::WorkerStart { index, source });
                }
            }
        }
        Ok(workers)
    }
}

fn join_workers(workers: Vec<Box<dyn Worker>>) -> u32 {
    let mut crashed = 0;
    for (index, worker) in workers.into_iter().enumerate() {
        if let WorkerExit::Crashed(reason) = worker.join() {
            warn!(worker = index, %reason, "load unit crashed");
            crashed += 1;
        }
    }
    crashed
}

fn banner_text(config: &RunConfig, approx: f64) -> String {
    format!(
        "Stress test starting...\n\
         Configuration:\n  \
         Processes (Cores) Used: {}\n  \
         Load per process:       {}%\n  \
         Duration:               {} seconds\n\
         Approx. Global Load: {:.1}% (Estimated)",
        config.cores_to_use, config.load_percentage, config.duration_seconds, approx
    )
}
