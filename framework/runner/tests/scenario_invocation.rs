use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use build_profiler_core::prelude::{
    BuildContext, ScenarioContext, TransportError, ValidationError, WorkerId,
};
use build_profiler_runner::prelude::{
    run, BuildAction, BuildClient, BuildConfiguration, BuildInvoker, BuildRequest, BuildToolchain,
    ClearDirectoryMutator, HookResult, InvocationSettings, Mutator, Profiler, ProfilerController,
    ProfilerTarget, RecordingOptions, RunContext, RunOutcome, ScenarioDefinition,
    ScenarioDefinitionBuilder, Schedule, PID_FILE_ENV,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workers {
    /// Reused invokers keep one worker, cold invokers get a new one for every build.
    AsPromised,
    AlwaysNew,
    AlwaysSame,
}

struct FakeToolchain {
    events: Events,
    requests: Arc<Mutex<Vec<BuildRequest>>>,
    killed: Arc<Mutex<Vec<WorkerId>>>,
    next_pid: Arc<AtomicU32>,
    workers: Workers,
    /// Fails the n-th invocation, counting from 1, of the given version.
    fail: Option<(&'static str, usize)>,
}

impl FakeToolchain {
    fn new(events: &Events) -> Self {
        Self {
            events: events.clone(),
            requests: Arc::new(Mutex::new(Vec::new())),
            killed: Arc::new(Mutex::new(Vec::new())),
            next_pid: Arc::new(AtomicU32::new(100)),
            workers: Workers::AsPromised,
            fail: None,
        }
    }
}

struct FakeClient {
    events: Events,
    requests: Arc<Mutex<Vec<BuildRequest>>>,
    next_pid: Arc<AtomicU32>,
    new_worker_per_build: bool,
    worker: u32,
    invocations: usize,
    fail_on: Option<usize>,
}

impl BuildClient for FakeClient {
    fn run(&mut self, request: &BuildRequest) -> anyhow::Result<()> {
        self.invocations += 1;
        self.events
            .lock()
            .push(format!("run {}", request.tasks.join(" ")));
        self.requests.lock().push(request.clone());

        if self.new_worker_per_build {
            self.worker = self.next_pid.fetch_add(1, Ordering::SeqCst);
        }
        let (_, pid_file) = request
            .env
            .iter()
            .find(|(key, _)| key == PID_FILE_ENV)
            .expect("pid file is always handed to the build");
        std::fs::write(pid_file, format!("{}\nconfiguration=12.5\n", self.worker))?;

        if self.fail_on == Some(self.invocations) {
            return Err(TransportError::NonZeroExit {
                command: request.tasks.join(" "),
                status: "exit status: 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.events.lock().push("close".to_string());
        Ok(())
    }
}

impl BuildToolchain for FakeToolchain {
    fn client(
        &self,
        build: &BuildConfiguration,
        invoker: BuildInvoker,
        _project_dir: &Path,
    ) -> anyhow::Result<Box<dyn BuildClient>> {
        let new_worker_per_build = match self.workers {
            Workers::AsPromised => !invoker.reuses_worker(),
            Workers::AlwaysNew => true,
            Workers::AlwaysSame => false,
        };
        Ok(Box::new(FakeClient {
            events: self.events.clone(),
            requests: self.requests.clone(),
            next_pid: self.next_pid.clone(),
            new_worker_per_build,
            worker: self.next_pid.fetch_add(1, Ordering::SeqCst),
            invocations: 0,
            fail_on: self
                .fail
                .filter(|(version, _)| *version == build.version)
                .map(|(_, n)| n),
        }))
    }

    fn stop_workers(&self, build: &BuildConfiguration, _project_dir: &Path) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(format!("stop_workers {}", build.version));
        Ok(())
    }

    fn kill_worker(&self, worker: &WorkerId) -> anyhow::Result<()> {
        self.killed.lock().push(worker.clone());
        Ok(())
    }
}

struct RecordingMutator {
    events: Events,
}

impl Display for RecordingMutator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("recording")
    }
}

fn outcome(error: Option<&anyhow::Error>) -> &'static str {
    if error.is_some() {
        "failed"
    } else {
        "ok"
    }
}

impl Mutator for RecordingMutator {
    fn before_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        self.events.lock().push("before_scenario".to_string());
        Ok(())
    }

    fn before_cleanup(&mut self, context: &BuildContext) -> HookResult {
        self.events.lock().push(format!(
            "before_cleanup {}#{}",
            context.phase(),
            context.iteration()
        ));
        Ok(())
    }

    fn after_cleanup(&mut self, context: &BuildContext, error: Option<&anyhow::Error>) -> HookResult {
        self.events.lock().push(format!(
            "after_cleanup {}#{} {}",
            context.phase(),
            context.iteration(),
            outcome(error)
        ));
        Ok(())
    }

    fn before_build(&mut self, context: &BuildContext) -> HookResult {
        self.events.lock().push(format!(
            "before_build {}#{}",
            context.phase(),
            context.iteration()
        ));
        Ok(())
    }

    fn after_build(&mut self, context: &BuildContext, error: Option<&anyhow::Error>) -> HookResult {
        self.events.lock().push(format!(
            "after_build {}#{} {}",
            context.phase(),
            context.iteration(),
            outcome(error)
        ));
        Ok(())
    }

    fn after_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        self.events.lock().push("after_scenario".to_string());
        Ok(())
    }
}

#[derive(Debug)]
struct RecordingProfiler {
    events: Events,
}

struct RecordingController {
    events: Events,
}

impl Profiler for RecordingProfiler {
    fn name(&self) -> &str {
        "recording"
    }

    fn instrumentation_args(&self, _target: &ProfilerTarget, options: RecordingOptions) -> Vec<String> {
        vec![format!(
            "-profile:start={},capture={}",
            options.start_on_launch, options.capture_on_exit
        )]
    }

    fn new_controller(&self, _target: &ProfilerTarget) -> anyhow::Result<Box<dyn ProfilerController>> {
        Ok(Box::new(RecordingController {
            events: self.events.clone(),
        }))
    }
}

impl ProfilerController for RecordingController {
    fn start_session(&mut self) -> HookResult {
        self.events.lock().push("start_session".to_string());
        Ok(())
    }

    fn start_recording(&mut self) -> HookResult {
        self.events.lock().push("start_recording".to_string());
        Ok(())
    }

    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult {
        let worker = worker.map(|w| w.to_string()).unwrap_or_default();
        self.events
            .lock()
            .push(format!("stop_recording {worker}"));
        Ok(())
    }

    fn stop_session(&mut self) -> HookResult {
        self.events.lock().push("stop_session".to_string());
        Ok(())
    }
}

struct Harness {
    dir: tempfile::TempDir,
    events: Events,
    settings: InvocationSettings,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = InvocationSettings::new(dir.path(), dir.path().join("out"));
        settings.show_progress = false;
        settings.console_summary = false;
        Self {
            dir,
            events: Arc::new(Mutex::new(Vec::new())),
            settings,
        }
    }

    fn with_profiler(mut self) -> Self {
        self.settings.profiler = Some(Arc::new(RecordingProfiler {
            events: self.events.clone(),
        }));
        self
    }

    fn scenario(&self, name: &str, versions: &[&str]) -> ScenarioDefinitionBuilder {
        let events = self.events.clone();
        let mut builder = ScenarioDefinitionBuilder::new(name)
            .use_action(BuildAction::run_tasks(["build"]))
            .use_measured_timing("configuration")
            .use_mutator(move || {
                Ok(Box::new(RecordingMutator {
                    events: events.clone(),
                }) as Box<dyn Mutator>)
            });
        for version in versions {
            builder = builder.use_build(BuildConfiguration::new(*version, "tool"));
        }
        builder
    }

    fn run(&self, toolchain: FakeToolchain, scenarios: &[ScenarioDefinition]) -> anyhow::Result<RunOutcome> {
        let context = RunContext::new(self.settings.clone())
            .unwrap()
            .with_toolchain(Arc::new(toolchain));
        run(&context, scenarios)
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn reused_worker_runs_warm_ups_then_records_measured_builds() {
    let harness = Harness::new().with_profiler();
    let scenario = harness
        .scenario("incremental", &["1"])
        .use_warm_ups(2)
        .use_iterations(3)
        .build(&harness.settings)
        .unwrap();

    let outcome = harness
        .run(FakeToolchain::new(&harness.events), &[scenario])
        .unwrap();

    assert_eq!(
        strings(&[
            "stop_workers 1",
            "before_scenario",
            "before_build WARM_UP#1",
            "run build",
            "after_build WARM_UP#1 ok",
            "before_build WARM_UP#2",
            "run build",
            "after_build WARM_UP#2 ok",
            "start_session",
            "before_build MEASURE#1",
            "start_recording",
            "run build",
            "after_build MEASURE#1 ok",
            "before_build MEASURE#2",
            "run build",
            "after_build MEASURE#2 ok",
            "before_build MEASURE#3",
            "run build",
            "stop_recording 100",
            "after_build MEASURE#3 ok",
            "stop_session",
            "after_scenario",
            "close",
            "stop_workers 1",
        ]),
        harness.events()
    );

    let result = &outcome.results().results()[0];
    assert_eq!(5, result.results().len());
    assert_eq!(3, result.measured_results().len());
    assert_eq!("measured build #1", result.measured_results()[0].display_name());
    assert!(result
        .results()
        .iter()
        .all(|r| r.worker_id() == Some(&WorkerId::new("100"))));
    assert!(outcome.failures().is_empty());
    assert!(outcome.into_result().is_ok());
}

#[test]
fn reused_worker_is_instrumented_for_every_build() {
    let harness = Harness::new().with_profiler();
    let scenario = harness
        .scenario("s", &["1"])
        .use_warm_ups(1)
        .use_iterations(1)
        .build(&harness.settings)
        .unwrap();
    let toolchain = FakeToolchain::new(&harness.events);
    let requests = toolchain.requests.clone();

    harness.run(toolchain, &[scenario]).unwrap();

    for request in requests.lock().iter() {
        assert!(request
            .process_args
            .contains(&"-profile:start=false,capture=false".to_string()));
        assert!(request
            .process_args
            .contains(&"-Dbuild_profiler.scenario=s".to_string()));
    }
}

#[test]
fn cold_workers_are_distinct_and_only_measured_builds_are_instrumented() {
    let harness = Harness::new().with_profiler();
    let scenario = harness
        .scenario("cold", &["1"])
        .use_invoker(BuildInvoker::CliNoWorker)
        .use_warm_ups(4)
        .use_iterations(2)
        .build(&harness.settings)
        .unwrap();
    assert_eq!(1, scenario.warm_up_count);
    let toolchain = FakeToolchain::new(&harness.events);
    let requests = toolchain.requests.clone();

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    let result = &outcome.results().results()[0];
    assert_eq!(3, result.results().len());
    let mut workers = result
        .results()
        .iter()
        .filter_map(|r| r.worker_id().cloned())
        .collect::<Vec<_>>();
    workers.dedup();
    assert_eq!(3, workers.len());

    let instrumented = requests
        .lock()
        .iter()
        .map(|r| {
            r.process_args
                .contains(&"-profile:start=true,capture=true".to_string())
        })
        .collect::<Vec<_>>();
    assert_eq!(vec![false, true, true], instrumented);
    // Recording starts with the worker and is captured when it exits.
    assert_eq!(0, harness.count("start_recording"));
    assert_eq!(1, harness.count("start_session"));
    assert_eq!(1, harness.count("stop_session"));
}

#[test]
fn cold_workers_are_killed_after_every_build() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("cold", &["1"])
        .use_invoker(BuildInvoker::CliColdWorker)
        .use_iterations(2)
        .build(&harness.settings)
        .unwrap();
    let toolchain = FakeToolchain::new(&harness.events);
    let killed = toolchain.killed.clone();

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    let reported = outcome.results().results()[0]
        .results()
        .iter()
        .filter_map(|r| r.worker_id().cloned())
        .collect::<Vec<_>>();
    assert_eq!(3, reported.len());
    assert_eq!(reported, *killed.lock());
}

#[test]
fn reused_transport_fails_when_worker_changes() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("s", &["1"])
        .use_warm_ups(2)
        .use_iterations(1)
        .build(&harness.settings)
        .unwrap();
    let mut toolchain = FakeToolchain::new(&harness.events);
    toolchain.workers = Workers::AlwaysNew;

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    assert_eq!(1, outcome.failures().len());
    assert!(
        outcome.failures()[0].message.contains("Multiple build workers were used"),
        "{}",
        outcome.failures()[0].message
    );
    assert!(outcome.results().results()[0].results().is_empty());
    assert_eq!(1, harness.count("after_scenario"));
    assert_eq!(1, harness.count("close"));
}

#[test]
fn cold_transport_fails_when_worker_is_reused() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("s", &["1"])
        .use_invoker(BuildInvoker::CliNoWorker)
        .use_iterations(2)
        .build(&harness.settings)
        .unwrap();
    let mut toolchain = FakeToolchain::new(&harness.events);
    toolchain.workers = Workers::AlwaysSame;

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    assert_eq!(1, outcome.failures().len());
    assert!(outcome.failures()[0].message.contains("was reused but should not be reused"));
}

#[test]
fn failed_pair_does_not_stop_the_run() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("s", &["1", "2"])
        .use_warm_ups(1)
        .use_iterations(3)
        .build(&harness.settings)
        .unwrap();
    let mut toolchain = FakeToolchain::new(&harness.events);
    // The warm-up and the first measured build pass, the second measured build fails.
    toolchain.fail = Some(("1", 3));

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    assert_eq!(1, harness.count("after_build MEASURE#2 failed"));
    // Only the second version gets to its third measured build.
    assert_eq!(1, harness.count("before_build MEASURE#3"));
    assert_eq!(2, harness.count("after_scenario"));
    assert_eq!(2, harness.count("close"));
    assert_eq!(4, harness.count("stop_workers 1") + harness.count("stop_workers 2"));

    let results = outcome.results().results();
    assert_eq!(Some("measured build #2 failed: Build failed: `build` exited with exit status: 1"), results[0].failure());
    assert!(results[0].results().is_empty());
    assert_eq!(4, results[1].results().len());
    assert_eq!(3, results[1].statistics()[0].statistics.as_ref().unwrap().count);

    let summary = std::fs::read_to_string(harness.dir.path().join("out/benchmark.json")).unwrap();
    assert!(summary.contains("\"version\": \"2\""));
    assert!(summary.contains("\"state\": \"failed\"") || summary.contains("\"state\":\"failed\""));

    let err = outcome.into_result().unwrap_err();
    assert_eq!("1 of 2 scenario runs failed: s using 1", err.to_string());
}

#[test]
fn cleanup_brackets_every_measured_build() {
    let harness = Harness::new().with_profiler();
    let scenario = harness
        .scenario("clean", &["1"])
        .use_cleanup(BuildAction::run_tasks(["clean"]))
        .use_warm_ups(1)
        .use_iterations(3)
        .build(&harness.settings)
        .unwrap();

    harness
        .run(FakeToolchain::new(&harness.events), &[scenario])
        .unwrap();

    assert_eq!(3, harness.count("start_recording"));
    assert_eq!(3, harness.count("stop_recording 100"));
    assert_eq!(4, harness.count("run clean"));
    for iteration in ["WARM_UP#1", "MEASURE#1", "MEASURE#2", "MEASURE#3"] {
        assert_eq!(1, harness.count(&format!("before_cleanup {iteration}")));
        assert_eq!(1, harness.count(&format!("after_cleanup {iteration} ok")));
        assert_eq!(1, harness.count(&format!("after_build {iteration} ok")));
    }
}

#[test]
fn failed_cleanup_is_passed_to_after_cleanup() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("clean", &["1"])
        .use_cleanup(BuildAction::run_tasks(["clean"]))
        .use_warm_ups(1)
        .use_iterations(1)
        .build(&harness.settings)
        .unwrap();
    let mut toolchain = FakeToolchain::new(&harness.events);
    toolchain.fail = Some(("1", 1));

    let outcome = harness.run(toolchain, &[scenario]).unwrap();

    assert_eq!(1, harness.count("after_cleanup WARM_UP#1 failed"));
    assert_eq!(0, harness.count("before_build WARM_UP#1"));
    assert_eq!(1, harness.count("after_scenario"));
    assert_eq!(1, outcome.failures().len());
}

#[test]
fn invalid_scenarios_fail_before_any_build() {
    let harness = Harness::new();
    let cache = harness.dir.path().join("cache");
    let scenario = harness
        .scenario("s", &["1"])
        .use_mutator(move || {
            Ok(Box::new(ClearDirectoryMutator::clear(cache.clone(), Schedule::Build)) as Box<dyn Mutator>)
        })
        .build(&harness.settings)
        .unwrap();

    let err = harness
        .run(FakeToolchain::new(&harness.events), &[scenario])
        .unwrap_err();

    assert!(err.downcast_ref::<ValidationError>().is_some());
    assert!(harness.events().is_empty());
}

#[test]
fn interrupted_run_skips_remaining_pairs() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("s", &["1", "2"])
        .build(&harness.settings)
        .unwrap();
    let context = RunContext::new(harness.settings.clone())
        .unwrap()
        .with_toolchain(Arc::new(FakeToolchain::new(&harness.events)));
    context.interrupt_handle().interrupt();

    let outcome = run(&context, &[scenario]).unwrap();

    assert!(harness.events().is_empty());
    assert_eq!(2, outcome.failures().len());
    assert_eq!(2, outcome.attempted());
    assert!(outcome.failures()[0].message.contains("interrupted"));
}

#[test]
fn secondary_timings_are_sampled() {
    let harness = Harness::new();
    let scenario = harness
        .scenario("s", &["1"])
        .use_warm_ups(1)
        .use_iterations(2)
        .build(&harness.settings)
        .unwrap();

    let outcome = harness
        .run(FakeToolchain::new(&harness.events), &[scenario])
        .unwrap();

    let statistics = outcome.results().results()[0].statistics();
    assert_eq!("configuration", statistics[1].sample.name());
    assert_eq!(12.5, statistics[1].statistics.as_ref().unwrap().mean);
}
