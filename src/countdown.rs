use std::sync::Arc;
use std::time::Instant;

use crate::config::Pacing;
use crate::deadline::StopSignal;
use crate::reporter::Reporter;

/// Remaining-time ticks for the operator. Has no say over when work stops.
pub struct Countdown {
    reporter: Arc<dyn Reporter>,
    pacing: Pacing,
}

impl Countdown {
    pub fn new(reporter: Arc<dyn Reporter>, pacing: Pacing) -> Self {
        Self { reporter, pacing }
    }

    /// Emits `duration_seconds, ..., 1`, tick `k` scheduled at
    /// `start + k * window`, then the terminator. Returns ticks emitted.
    pub fn run(&self, start: Instant, duration_seconds: u64, stop: &StopSignal) -> u64 {
        let mut emitted = 0;
        for remaining in (1..=duration_seconds).rev() {
            self.reporter.tick(remaining);
            emitted += 1;
            if stop.wait_until(start + self.pacing.span(emitted)) {
                break;
            }
        }
        self.reporter.tick_done();
        emitted
    }
}
