use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;

use cpu_duty_stress::cpu_stress::DutyCycle;
use cpu_duty_stress::{
    ConfigError, Deadline, EnvironmentProbe, Pacing, ProbeError, Reporter, RunConfig, RunSummary,
    StopSignal, StressError, StressOrchestrator, ThreadSpawner, Worker, WorkerExit, WorkerSpawner,
};

const WINDOW: Duration = Duration::from_millis(25);

struct FixedProbe {
    threads: usize,
    usage: Mutex<Vec<Result<f32, ProbeError>>>,
}

impl FixedProbe {
    fn new(threads: usize, mut usage: Vec<Result<f32, ProbeError>>) -> Arc<Self> {
        usage.reverse();
        Arc::new(Self {
            threads,
            usage: Mutex::new(usage),
        })
    }
}

impl EnvironmentProbe for FixedProbe {
    fn logical_processor_count(&self) -> Result<usize, ProbeError> {
        Ok(self.threads)
    }

    fn cpu_utilization_percent(&self) -> Result<f32, ProbeError> {
        self.usage.lock().unwrap().pop().unwrap_or(Ok(10.0))
    }
}

#[derive(Default)]
struct Recorder {
    banners: Mutex<Vec<String>>,
    ticks: Mutex<Vec<u64>>,
    warnings: Mutex<Vec<f32>>,
    errors: Mutex<Vec<String>>,
    done: Mutex<Vec<RunSummary>>,
}

impl Reporter for Recorder {
    fn banner(&self, text: &str) {
        self.banners.lock().unwrap().push(text.to_string());
    }
    fn tick(&self, seconds_remaining: u64) {
        self.ticks.lock().unwrap().push(seconds_remaining);
    }
    fn tick_done(&self) {}
    fn warn(&self, usage_percent: f32) {
        self.warnings.lock().unwrap().push(usage_percent);
    }
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
    fn done(&self, summary: &RunSummary) {
        self.done.lock().unwrap().push(summary.clone());
    }
}

/// Counts spawned and joined units on top of the thread spawner.
#[derive(Clone, Default)]
struct CountingSpawner {
    spawned: Arc<AtomicUsize>,
    joined: Arc<AtomicUsize>,
    fail_at: Option<usize>,
    crash_at: Option<usize>,
}

struct CountingWorker {
    inner: Box<dyn Worker>,
    joined: Arc<AtomicUsize>,
    crash: bool,
}

impl Worker for CountingWorker {
    fn cancel(&mut self) {
        self.inner.cancel();
    }

    fn join(self: Box<Self>) -> WorkerExit {
        let exit = self.inner.join();
        self.joined.fetch_add(1, Ordering::SeqCst);
        if self.crash {
            WorkerExit::Crashed("injected".into())
        } else {
            exit
        }
    }
}

impl WorkerSpawner for CountingSpawner {
    fn spawn(
        &self,
        index: usize,
        cycle: DutyCycle,
        deadline: Deadline,
        stop: &StopSignal,
    ) -> io::Result<Box<dyn Worker>> {
        if self.fail_at == Some(index) {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "process limit reached"));
        }
        let inner = ThreadSpawner.spawn(index, cycle, deadline, stop)?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingWorker {
            inner,
            joined: self.joined.clone(),
            crash: self.crash_at == Some(index),
        }))
    }
}

fn orchestrator(
    probe: Arc<FixedProbe>,
    reporter: Arc<Recorder>,
    spawner: CountingSpawner,
) -> StressOrchestrator {
    StressOrchestrator::new(probe, reporter, Box::new(spawner)).with_pacing(Pacing::new(WINDOW))
}

#[test]
fn reference_run_estimates_and_joins_every_worker() {
    let reporter = Arc::new(Recorder::default());
    let spawner = CountingSpawner::default();
    let config = RunConfig::new(4, 50, 3).unwrap();

    let start = Instant::now();
    let summary = orchestrator(FixedProbe::new(8, vec![]), reporter.clone(), spawner.clone())
        .execute(&config)
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.approx_global_load, 25.0);
    assert_eq!(summary.workers, 4);
    assert_eq!(summary.crashed_workers, 0);
    assert!(!summary.warning_fired);
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 4);
    assert_eq!(spawner.joined.load(Ordering::SeqCst), 4);

    assert!(elapsed >= WINDOW * 3);
    assert!(elapsed < WINDOW * 3 + WINDOW + Duration::from_millis(100));

    assert_eq!(*reporter.ticks.lock().unwrap(), vec![3, 2, 1]);
    assert!(reporter.banners.lock().unwrap()[0].contains("25.0% (Estimated)"));
    assert_eq!(*reporter.done.lock().unwrap(), vec![summary]);
}

#[test]
fn sustained_high_usage_warns_exactly_once() {
    let reporter = Arc::new(Recorder::default());
    let probe = FixedProbe::new(4, vec![Ok(85.0); 100]);
    let config = RunConfig::new(2, 100, 4).unwrap();

    let summary = orchestrator(probe, reporter.clone(), CountingSpawner::default())
        .execute(&config)
        .unwrap();

    assert!(summary.warning_fired);
    assert_eq!(*reporter.warnings.lock().unwrap(), vec![85.0]);
}

#[test]
fn consecutive_runs_do_not_share_warning_state() {
    let config = RunConfig::new(1, 10, 2).unwrap();

    let first = Arc::new(Recorder::default());
    orchestrator(FixedProbe::new(4, vec![Ok(99.0)]), first.clone(), CountingSpawner::default())
        .execute(&config)
        .unwrap();
    let second = Arc::new(Recorder::default());
    let summary = orchestrator(FixedProbe::new(4, vec![Ok(99.0)]), second.clone(), CountingSpawner::default())
        .execute(&config)
        .unwrap();

    assert!(summary.warning_fired);
    assert_eq!(first.warnings.lock().unwrap().len(), 1);
    assert_eq!(second.warnings.lock().unwrap().len(), 1);
}

#[test]
fn monitor_failure_does_not_stop_load() {
    let reporter = Arc::new(Recorder::default());
    let spawner = CountingSpawner::default();
    let probe = FixedProbe::new(4, vec![Err(ProbeError::Query("gone".into()))]);
    let config = RunConfig::new(3, 40, 3).unwrap();

    let start = Instant::now();
    let summary = orchestrator(probe, reporter.clone(), spawner.clone())
        .execute(&config)
        .unwrap();

    assert!(start.elapsed() >= WINDOW * 3);
    assert_eq!(summary.monitor_error, Some(ProbeError::Query("gone".into())));
    assert_eq!(spawner.joined.load(Ordering::SeqCst), 3);
    assert_eq!(reporter.errors.lock().unwrap().len(), 1);
}

#[test]
fn invalid_configs_start_nothing() {
    let cases = [
        (
            RunConfig { cores_to_use: 0, load_percentage: 50, duration_seconds: 3 },
            ConfigError::Cores(0),
        ),
        (
            RunConfig { cores_to_use: 4, load_percentage: 101, duration_seconds: 3 },
            ConfigError::Load(101),
        ),
        (
            RunConfig { cores_to_use: 4, load_percentage: 50, duration_seconds: 0 },
            ConfigError::Duration(0),
        ),
    ];

    for (config, expected) in cases {
        let reporter = Arc::new(Recorder::default());
        let spawner = CountingSpawner::default();
        let err = orchestrator(FixedProbe::new(8, vec![]), reporter.clone(), spawner.clone())
            .execute(&config)
            .unwrap_err();

        assert!(matches!(err, StressError::Config(ref e) if *e == expected), "{err}");
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 0);
        assert!(reporter.banners.lock().unwrap().is_empty());
        assert!(reporter.ticks.lock().unwrap().is_empty());
    }

    assert_eq!(RunConfig::new(4, 50, -1), Err(ConfigError::Duration(-1)));
}

#[test]
fn spawn_failure_cancels_started_units_and_aborts() {
    let reporter = Arc::new(Recorder::default());
    let spawner = CountingSpawner {
        fail_at: Some(2),
        ..CountingSpawner::default()
    };
    let config = RunConfig::new(4, 100, 3600).unwrap();

    let start = Instant::now();
    let err = StressOrchestrator::new(FixedProbe::new(8, vec![]), reporter.clone(), Box::new(spawner.clone()))
        .execute(&config)
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(matches!(err, StressError::WorkerStart { index: 2, .. }), "{err}");
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 2);
    assert_eq!(spawner.joined.load(Ordering::SeqCst), 2);
    assert!(reporter.done.lock().unwrap().is_empty());

    let errors = reporter.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("failed to start load worker 2"), "{}", errors[0]);
}

#[test]
fn huge_core_count_fails_at_first_spawn_instead_of_preallocating() {
    let reporter = Arc::new(Recorder::default());
    let spawner = CountingSpawner {
        fail_at: Some(0),
        ..CountingSpawner::default()
    };
    let config = RunConfig::new(i64::from(u32::MAX), 50, 2).unwrap();

    let err = orchestrator(FixedProbe::new(8, vec![]), reporter.clone(), spawner.clone())
        .execute(&config)
        .unwrap_err();

    assert!(matches!(err, StressError::WorkerStart { index: 0, .. }), "{err}");
    assert!(err.is_run_abort());
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 0);
    assert_eq!(reporter.errors.lock().unwrap().len(), 1);
}

#[test]
fn crashed_unit_is_counted_without_aborting_the_rest() {
    let spawner = CountingSpawner {
        crash_at: Some(1),
        ..CountingSpawner::default()
    };
    let config = RunConfig::new(3, 30, 2).unwrap();

    let summary = orchestrator(FixedProbe::new(4, vec![]), Arc::new(Recorder::default()), spawner.clone())
        .execute(&config)
        .unwrap();

    assert_eq!(summary.crashed_workers, 1);
    assert_eq!(spawner.joined.load(Ordering::SeqCst), 3);
}

#[test]
fn oversubscription_still_starts_every_unit() {
    let spawner = CountingSpawner::default();
    let config = RunConfig::new(6, 100, 1).unwrap();

    let summary = orchestrator(FixedProbe::new(2, vec![]), Arc::new(Recorder::default()), spawner.clone())
        .execute(&config)
        .unwrap();

    assert_eq!(summary.approx_global_load, 100.0);
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 6);
}

#[test]
fn any_load_percentage_finishes_on_time() {
    let mut rng = rand::rng();
    for _ in 0..3 {
        let load = rng.random_range(1..=100);
        let config = RunConfig::new(2, load, 2).unwrap();
        let start = Instant::now();
        orchestrator(FixedProbe::new(4, vec![]), Arc::new(Recorder::default()), CountingSpawner::default())
            .execute(&config)
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= WINDOW * 2, "load {load}");
        assert!(elapsed < WINDOW * 3 + Duration::from_millis(100), "load {load}: {elapsed:?}");
    }
}
