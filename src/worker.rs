use std::any::Any;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::cpu_stress::{self, DutyCycle, LoadStats};
use crate::deadline::{Deadline, StopSignal};

/// How a load unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Completed,
    Crashed(String),
}

/// A started load unit.
pub trait Worker: Send {
    /// Asks the unit to stop early. Does not wait for it.
    fn cancel(&mut self);

    /// Blocks until the unit has terminated.
    fn join(self: Box<Self>) -> WorkerExit;
}

/// Starts load units in their own fault domain.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(
        &self,
        index: usize,
        cycle: DutyCycle,
        deadline: Deadline,
        stop: &StopSignal,
    ) -> io::Result<Box<dyn Worker>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnMode {
    /// One forked OS process per unit (unix only).
    #[default]
    Process,
    /// One OS thread per unit.
    Thread,
}

impl SpawnMode {
    /// The spawner for this mode, falling back to threads where fork is unavailable.
    pub fn spawner(self) -> Box<dyn WorkerSpawner> {
        match self {
            #[cfg(unix)]
            SpawnMode::Process => Box::new(crate::fork_stress::ProcessSpawner),
            #[cfg(not(unix))]
            SpawnMode::Process => Box::new(ThreadSpawner),
            SpawnMode::Thread => Box::new(ThreadSpawner),
        }
    }
}

impl fmt::Display for SpawnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnMode::Process => f.write_str("process"),
            SpawnMode::Thread => f.write_str("thread"),
        }
    }
}

impl FromStr for SpawnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" | "fork" => Ok(SpawnMode::Process),
            "thread" => Ok(SpawnMode::Thread),
            other => Err(format!("unknown spawn mode {other:?} (expected process or thread)")),
        }
    }
}

/// Runs each load unit on a named OS thread. A panic in one unit is caught
/// at join and reported as a crash.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

struct ThreadWorker {
    index: usize,
    stop: StopSignal,
    handle: JoinHandle<LoadStats>,
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(
        &self,
        index: usize,
        cycle: DutyCycle,
        deadline: Deadline,
        stop: &StopSignal,
    ) -> io::Result<Box<dyn Worker>> {
        let own_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("load-unit-{index}"))
            .spawn(move || cpu_stress::run(&cycle, deadline, Some(&own_stop)))?;

        Ok(Box::new(ThreadWorker {
            index,
            stop: stop.clone(),
            handle,
        }))
    }
}

impl Worker for ThreadWorker {
    fn cancel(&mut self) {
        self.stop.cancel();
    }

    fn join(self: Box<Self>) -> WorkerExit {
        match self.handle.join() {
            Ok(stats) => {
                debug!(
                    worker = self.index,
                    windows = stats.windows,
                    busy_ms = stats.busy.as_millis() as u64,
                    idle_ms = stats.idle.as_millis() as u64,
                    "load unit finished"
                );
                WorkerExit::Completed
            }
            Err(payload) => WorkerExit::Crashed(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked".to_string()
    }
}
