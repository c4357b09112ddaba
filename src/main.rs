use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cpu_duty_stress::config::DEFAULT_LOG_FILE;
use cpu_duty_stress::prompt;
use cpu_duty_stress::reporter::{ConsoleReporter, Fanout, LogFileReporter};
use cpu_duty_stress::{
    EnvironmentProbe, Reporter, RunConfig, SpawnMode, StressError, StressOrchestrator, SysinfoProbe,
};

/// Loads CPU cores at a fixed duty cycle for a bounded time.
///
/// Values not given as flags are asked for interactively.
#[derive(Parser, Debug)]
#[command(name = "cpu-duty-stress", version, about)]
struct Args {
    /// Number of worker processes (cores) to stress
    #[arg(short, long, allow_negative_numbers = true)]
    cores: Option<i64>,

    /// CPU load percentage per core (1-100)
    #[arg(short, long, allow_negative_numbers = true)]
    load: Option<i64>,

    /// Duration in seconds
    #[arg(short, long, allow_negative_numbers = true)]
    duration: Option<i64>,

    /// Run load units as forked processes or threads
    #[arg(long, default_value_t = SpawnMode::Process)]
    mode: SpawnMode,

    /// File the run is logged to
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Do not write the log file
    #[arg(long)]
    no_log: bool,

    /// Run without root privileges
    #[arg(long)]
    allow_unprivileged: bool,

    /// Do not clear the screen
    #[arg(long)]
    no_clear: bool,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let reported = err
                .downcast_ref::<StressError>()
                .is_some_and(StressError::is_run_abort);
            if !reported {
                prompt::print_error(&format!("{err:#}"));
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    if !args.no_clear {
        prompt::clear_screen();
    }

    let probe = Arc::new(SysinfoProbe::new().context("cannot read CPU information")?);
    let logical = probe
        .logical_processor_count()
        .context("cannot count logical processors")?;
    prompt::print_header(logical, probe.physical_core_count());

    if !prompt::is_privileged() && !args.allow_unprivileged {
        let program = std::env::args().next().unwrap_or_else(|| "cpu-duty-stress".into());
        prompt::print_root_required(&program);
        bail!("root privileges required");
    }

    let (cores, load, duration) = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        prompt::collect_missing(&mut input, &mut output, args.cores, args.load, args.duration)?
    };
    let config = RunConfig::new(cores, load, duration)?;

    if !args.no_clear {
        prompt::clear_screen();
    }

    let mut reporter = Fanout::new().with(Arc::new(ConsoleReporter::new()));
    if !args.no_log {
        let log = LogFileReporter::open(&args.log_file)
            .with_context(|| format!("cannot open log file {}", args.log_file.display()))?;
        reporter = reporter.with(Arc::new(log));
    }
    let reporter: Arc<dyn Reporter> = Arc::new(reporter);

    info!(mode = %args.mode, "spawning load units");
    let orchestrator = StressOrchestrator::new(probe, reporter, args.mode.spawner());
    orchestrator.execute(&config)?;
    Ok(())
}
