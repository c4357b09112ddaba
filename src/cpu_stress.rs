use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use crate::deadline::{Deadline, StopSignal};

/// Per-window split between computation and sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    load_percentage: u32,
    window: Duration,
}

impl DutyCycle {
    pub fn new(load_percentage: u32, window: Duration) -> Self {
        Self {
            load_percentage: load_percentage.min(100),
            window,
        }
    }

    pub fn load_percentage(&self) -> u32 {
        self.load_percentage
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn busy(&self) -> Duration {
        self.window * self.load_percentage / 100
    }

    pub fn idle(&self) -> Duration {
        self.window - self.busy()
    }
}

/// What one load unit actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub windows: u64,
    pub sleep_phases: u64,
    pub busy: Duration,
    pub idle: Duration,
}

/// Runs compute-then-sleep windows until `deadline`.
///
/// Each window starts with a busy phase of `cycle.busy()` and sleeps for
/// whatever is left of the window. The last window is cut at the deadline.
/// `stop` is polled during both phases; pass `None` where no shared state may
/// be touched (a forked child).
pub fn run(cycle: &DutyCycle, deadline: Deadline, stop: Option<&StopSignal>) -> LoadStats {
    let mut stats = LoadStats::default();
    let end = deadline.instant();

    while Instant::now() < end {
        if stop.is_some_and(StopSignal::is_cancelled) {
            break;
        }

        let window_start = Instant::now();
        spin_until((window_start + cycle.busy()).min(end), stop);
        stats.busy += window_start.elapsed();
        stats.windows += 1;

        if cycle.idle().is_zero() {
            continue;
        }

        let wake = (window_start + cycle.window()).min(end);
        let idle_start = Instant::now();
        if idle_start >= wake {
            continue;
        }

        stats.sleep_phases += 1;
        let cancelled = match stop {
            Some(stop) => stop.wait_until(wake),
            None => {
                thread::sleep(wake - idle_start);
                false
            }
        };
        stats.idle += idle_start.elapsed();
        if cancelled {
            break;
        }
    }

    stats
}

/// Burns CPU on square roots until `until`. No allocation, no I/O.
fn spin_until(until: Instant, stop: Option<&StopSignal>) {
    while Instant::now() < until {
        black_box(black_box(987_654_321.0_f64).sqrt());
        if stop.is_some_and(StopSignal::is_cancelled) {
            return;
        }
    }
}
