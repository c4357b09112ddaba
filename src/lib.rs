//! Duty-cycle CPU stress engine.
//!
//! Loads `cores_to_use` workers at a fixed per-core duty cycle until a shared
//! deadline, while a monitor samples system-wide CPU usage and raises a
//! one-shot warning above [`monitor::WARN_THRESHOLD_PERCENT`].

pub mod config;
pub mod countdown;
pub mod cpu_stress;
pub mod deadline;
pub mod error;
pub mod fork_stress;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod prompt;
pub mod reporter;
pub mod worker;

pub use config::{Pacing, RunConfig};
pub use deadline::{Deadline, StopSignal};
pub use error::{ConfigError, ProbeError, StressError};
pub use orchestrator::{approx_global_load, RunSummary, StressOrchestrator};
pub use probe::{EnvironmentProbe, SysinfoProbe};
pub use reporter::Reporter;
pub use worker::{SpawnMode, ThreadSpawner, Worker, WorkerExit, WorkerSpawner};
