//! Operator-facing helpers for the binary: prompts, privilege check, header.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::warn;

use crate::error::ConfigError;

const RED: &str = "\x1b[31;1m";
const GREEN: &str = "\x1b[32;1m";
const YELLOW: &str = "\x1b[33;1m";
const BLUE: &str = "\x1b[34;1m";
const MAGENTA: &str = "\x1b[35;1m";
const CYAN: &str = "\x1b[36;1m";
const RESET: &str = "\x1b[0m";

/// Failure to obtain a number from the operator.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("cannot read answer for {field}: {source}")]
    Io {
        field: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Asks `question` and parses the answer as an integer.
pub fn ask_number<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    field: &'static str,
    question: &str,
) -> Result<i64, PromptError> {
    let io_error = |source: io::Error| PromptError::Io { field, source };

    write!(output, "{GREEN}{question}{RESET} ").map_err(io_error)?;
    output.flush().map_err(io_error)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(io_error)?;
    let answer = line.trim();
    answer.parse::<i64>().map_err(|_| {
        PromptError::Config(ConfigError::NotANumber {
            field,
            input: answer.to_string(),
        })
    })
}

/// Raw answers for the values not already given on the command line.
pub fn collect_missing<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    cores: Option<i64>,
    load: Option<i64>,
    duration: Option<i64>,
) -> Result<(i64, i64, i64), PromptError> {
    let cores = match cores {
        Some(c) => c,
        None => ask_number(input, output, "cores", "1. Enter the number of processes (cores) to stress:")?,
    };
    let load = match load {
        Some(l) => l,
        None => ask_number(input, output, "load", "2. Enter CPU load percentage per core (1-100):")?,
    };
    let duration = match duration {
        Some(d) => d,
        None => ask_number(input, output, "duration", "3. Enter duration in seconds:")?,
    };
    Ok((cores, load, duration))
}

#[cfg(unix)]
pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    true
}

pub fn clear_screen() {
    print!("\x1b[2J\x1b[1;1H");
    if let Err(err) = io::stdout().flush() {
        warn!(error = %err, "failed to flush stdout");
    }
}

pub fn print_header(logical_threads: usize, physical_cores: Option<usize>) {
    println!("{BLUE}{}{RESET}", crate::reporter::RULE);
    println!("{BLUE}======== {CYAN}CPU STRESS TEST{BLUE} ================{RESET}");
    println!("{BLUE}{}{RESET}", crate::reporter::RULE);
    println!("\n{MAGENTA}--- SYSTEM INFORMATION ---{RESET}");
    println!("{YELLOW}Logical CPUs (Threads):{RESET} {logical_threads}");
    match physical_cores {
        Some(cores) => println!("{YELLOW}Physical Cores:        {RESET} {cores}"),
        None => println!("{YELLOW}Physical Cores:        {RESET} unknown"),
    }
    println!("{BLUE}--------------------------{RESET}");
    println!("\n{RED}WARNING: Total CPU load should not exceed 100% per core!{RESET}\n");
}

pub fn print_root_required(program: &str) {
    eprintln!("\n{RED}--- ROOT ACCESS REQUIRED ---{RESET}");
    eprintln!("{RED}This tool requires root privileges (sudo) for stable operation and control.{RESET}");
    eprintln!("{YELLOW}Rerun with sudo, or pass --allow-unprivileged:{RESET}");
    eprintln!("{CYAN}sudo {program}{RESET}");
    eprintln!("{RED}----------------------------{RESET}\n");
}

pub fn print_error(message: &str) {
    eprintln!("{RED}{message}{RESET}");
}
