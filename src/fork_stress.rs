//! Process-per-unit fan-out built on `fork`/`waitpid`.
#![cfg(unix)]

use std::io;
use std::panic::{self, AssertUnwindSafe};

use libc::{c_int, pid_t};
use tracing::{debug, warn};

use crate::cpu_stress::{self, DutyCycle};
use crate::deadline::{Deadline, StopSignal};
use crate::worker::{Worker, WorkerExit, WorkerSpawner};

/// Forks one child process per load unit, so a crash in one unit cannot take
/// the others (or the coordinator) down with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

struct ProcessWorker {
    index: usize,
    pid: pid_t,
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(
        &self,
        index: usize,
        cycle: DutyCycle,
        deadline: Deadline,
        _stop: &StopSignal,
    ) -> io::Result<Box<dyn Worker>> {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(io::Error::last_os_error());
        }

        if pid == 0 {
            // Child: only the forking thread exists here, so no locks, no
            // logging and no allocation before _exit.
            let code = match panic::catch_unwind(AssertUnwindSafe(|| {
                cpu_stress::run(&cycle, deadline, None);
            })) {
                Ok(()) => 0,
                Err(_) => 101,
            };
            unsafe { libc::_exit(code) }
        }

        debug!(worker = index, pid, "forked load unit");
        Ok(Box::new(ProcessWorker { index, pid }))
    }
}

impl Worker for ProcessWorker {
    fn cancel(&mut self) {
        if unsafe { libc::kill(self.pid, libc::SIGKILL) } != 0 {
            warn!(
                worker = self.index,
                pid = self.pid,
                error = %io::Error::last_os_error(),
                "failed to signal load unit"
            );
        }
    }

    fn join(self: Box<Self>) -> WorkerExit {
        let mut status: c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc == self.pid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return WorkerExit::Crashed(format!("waitpid failed: {err}"));
            }
        }

        let exit = describe_status(status);
        debug!(worker = self.index, pid = self.pid, ?exit, "load unit reaped");
        exit
    }
}

fn describe_status(status: c_int) -> WorkerExit {
    if libc::WIFEXITED(status) {
        match libc::WEXITSTATUS(status) {
            0 => WorkerExit::Completed,
            code => WorkerExit::Crashed(format!("exited with status {code}")),
        }
    } else if libc::WIFSIGNALED(status) {
        WorkerExit::Crashed(format!("killed by signal {}", libc::WTERMSIG(status)))
    } else {
        WorkerExit::Crashed(format!("unexpected wait status {status}"))
    }
}
