use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tracing::warn;

use crate::orchestrator::RunSummary;

const RED: &str = "\x1b[31;1m";
const GREEN: &str = "\x1b[32;1m";
const YELLOW: &str = "\x1b[33;1m";
const CYAN: &str = "\x1b[36;1m";
const RESET: &str = "\x1b[0m";

pub const RULE: &str = "=========================================";

/// Sink for everything a run wants the operator to see.
///
/// Called from the orchestrator, monitor and countdown threads concurrently.
pub trait Reporter: Send + Sync {
    fn banner(&self, text: &str);
    fn tick(&self, seconds_remaining: u64);
    /// Countdown finished; ends the in-place tick line.
    fn tick_done(&self);
    fn warn(&self, usage_percent: f32);
    fn error(&self, message: &str);
    fn done(&self, summary: &RunSummary);
}

/// Colored terminal output. Ticks overwrite one line.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    out: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, line: &str, newline: bool) {
        let _guard = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if newline {
            println!("{line}");
        } else {
            print!("{line}");
        }
        if let Err(err) = io::stdout().flush() {
            warn!(error = %err, "failed to flush stdout");
        }
    }
}

impl Reporter for ConsoleReporter {
    fn banner(&self, text: &str) {
        self.emit(&format!("{GREEN}{RULE}{RESET}"), true);
        for line in text.lines() {
            self.emit(&format!("{CYAN}{line}{RESET}"), true);
        }
        self.emit(&format!("{GREEN}{RULE}{RESET}\n"), true);
    }

    fn tick(&self, seconds_remaining: u64) {
        self.emit(
            &format!("\r{CYAN}TIME REMAINING:{RESET} {seconds_remaining} seconds...   "),
            false,
        );
    }

    fn tick_done(&self) {
        self.emit("\n", true);
    }

    fn warn(&self, usage_percent: f32) {
        self.emit(
            &format!("\n{RED}WARNING! High global CPU usage detected: {usage_percent:.1}%{RESET}"),
            true,
        );
    }

    fn error(&self, message: &str) {
        self.emit(&format!("\n{RED}{message}{RESET}"), true);
    }

    fn done(&self, summary: &RunSummary) {
        self.emit(&format!("{GREEN}{RULE}{RESET}"), true);
        self.emit(&format!("{GREEN}Stress test successfully completed!{RESET}"), true);
        self.emit(&format!("{YELLOW}{summary}{RESET}"), true);
        self.emit(&format!("{GREEN}{RULE}{RESET}"), true);
    }
}

/// Appends timestamped lines to a log file. Ticks are not persisted.
#[derive(Debug)]
pub struct LogFileReporter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogFileReporter {
    /// Opens (creating if needed) the file once up front so a bad path fails early.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_log(&self, text: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "[{ts}] {text}"));
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "failed to write log file");
        }
    }
}

impl Reporter for LogFileReporter {
    fn banner(&self, text: &str) {
        self.write_log(text);
    }

    fn tick(&self, _seconds_remaining: u64) {}

    fn tick_done(&self) {}

    fn warn(&self, usage_percent: f32) {
        self.write_log(&format!("WARNING! High global CPU usage: {usage_percent:.1}%"));
    }

    fn error(&self, message: &str) {
        self.write_log(&format!("ERROR: {message}"));
    }

    fn done(&self, summary: &RunSummary) {
        self.write_log(&format!("Stress test finished! {summary}"));
    }
}

/// Forwards every call to each inner reporter in order.
#[derive(Default)]
pub struct Fanout {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl Reporter for Fanout {
    fn banner(&self, text: &str) {
        self.reporters.iter().for_each(|r| r.banner(text));
    }

    fn tick(&self, seconds_remaining: u64) {
        self.reporters.iter().for_each(|r| r.tick(seconds_remaining));
    }

    fn tick_done(&self) {
        self.reporters.iter().for_each(|r| r.tick_done());
    }

    fn warn(&self, usage_percent: f32) {
        self.reporters.iter().for_each(|r| r.warn(usage_percent));
    }

    fn error(&self, message: &str) {
        self.reporters.iter().for_each(|r| r.error(message));
    }

    fn done(&self, summary: &RunSummary) {
        self.reporters.iter().for_each(|r| r.done(summary));
    }
}
