use std::sync::{Mutex, PoisonError};

use sysinfo::System;

use crate::error::ProbeError;

/// Read-only view of the host's processors.
pub trait EnvironmentProbe: Send + Sync {
    fn logical_processor_count(&self) -> Result<usize, ProbeError>;

    /// Only used for the system information header.
    fn physical_core_count(&self) -> Option<usize> {
        None
    }

    /// System-wide utilization since the previous call, in percent.
    fn cpu_utilization_percent(&self) -> Result<f32, ProbeError>;
}

/// Probe backed by `sysinfo` for usage and `num_cpus` for counts.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    /// Takes the first usage reading so the next sample has a baseline.
    pub fn new() -> Result<Self, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::Unsupported);
        }
        let mut system = System::new();
        system.refresh_cpu_usage();
        if system.cpus().is_empty() {
            return Err(ProbeError::NoProcessors);
        }
        Ok(Self {
            system: Mutex::new(system),
        })
    }
}

impl EnvironmentProbe for SysinfoProbe {
    fn logical_processor_count(&self) -> Result<usize, ProbeError> {
        match num_cpus::get() {
            0 => Err(ProbeError::NoProcessors),
            n => Ok(n),
        }
    }

    fn physical_core_count(&self) -> Option<usize> {
        Some(num_cpus::get_physical())
    }

    fn cpu_utilization_percent(&self) -> Result<f32, ProbeError> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        if system.cpus().is_empty() {
            return Err(ProbeError::NoProcessors);
        }
        let usage = system.global_cpu_usage();
        if usage.is_finite() {
            Ok(usage.clamp(0.0, 100.0))
        } else {
            Err(ProbeError::Query(format!("non-finite usage reading {usage}")))
        }
    }
}
