//! Runs one (scenario, version) pair: warm-ups, then measured builds, with mutators and profiler
//! hooks around every step.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use build_profiler_core::prelude::{BuildContext, Phase, ScenarioContext};
use build_profiler_instruments::prelude::OperationRecord;
use build_profiler_summary_model::BuildInvocationResult;

use crate::build_config::BuildConfiguration;
use crate::context::RunContext;
use crate::definition::{BuildAction, ScenarioDefinition};
use crate::mutator::Mutator;
use crate::profiler::{
    controller_for, instrumentation_plan, InstrumentationPlan, NoOpController, ProfilerController,
    ProfilerTarget,
};
use crate::progress::Progress;
use crate::settings::InvocationSettings;
use crate::transport::{
    BuildClient, BuildRequest, BuildToolchain, PidInstrumentation, TransportKind,
    WorkerIdentityCheck, WorkerReport,
};
use crate::types::HookResult;

/// Tells the build which scenario it belongs to.
pub const SCENARIO_PROPERTY: &str = "build_profiler.scenario";

/// Arguments shared by every build of a pair, before any profiler instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairArgs {
    pub process_args: Vec<String>,
    pub tool_args: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
}

impl PairArgs {
    /// Properties given to the whole run win over those of the scenario.
    pub fn resolve(
        settings: &InvocationSettings,
        scenario: &ScenarioDefinition,
        build: &BuildConfiguration,
    ) -> Self {
        let mut system_properties = scenario.system_properties.clone();
        system_properties.extend(
            settings
                .system_properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let properties = system_properties
            .iter()
            .map(|(k, v)| format!("-D{k}={v}"))
            .collect::<Vec<_>>();

        let mut process_args = build.process_args.clone();
        process_args.extend(scenario.process_args.iter().cloned());
        process_args.extend(properties.iter().cloned());
        process_args.push(format!("-D{SCENARIO_PROPERTY}={}", scenario.name));

        let mut tool_args = properties;
        tool_args.extend(scenario.tool_args.iter().cloned());
        if settings.dry_run {
            tool_args.extend(build.dry_run_args.iter().cloned());
        }

        Self {
            process_args,
            tool_args,
            system_properties,
        }
    }
}

/// Stops the workers of a configuration when the pair ends, however it ends.
struct StopWorkersOnExit<'a> {
    toolchain: &'a dyn BuildToolchain,
    build: &'a BuildConfiguration,
    project_dir: &'a Path,
}

impl Drop for StopWorkersOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.toolchain.stop_workers(self.build, self.project_dir) {
            log::warn!("Failed to stop workers of {}: {e:?}", self.build.version);
        }
    }
}

/// The build tool client for one pair, together with the side channel its builds report through.
struct BuildUnderTest<'a> {
    client: Box<dyn BuildClient>,
    pid: PidInstrumentation,
    toolchain: &'a dyn BuildToolchain,
    kill_after_invocation: bool,
    closed: bool,
}

impl<'a> BuildUnderTest<'a> {
    fn new(toolchain: &'a dyn BuildToolchain, client: Box<dyn BuildClient>, kind: TransportKind) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            pid: PidInstrumentation::new()?,
            toolchain,
            kill_after_invocation: kind == TransportKind::ColdThenKill,
            closed: false,
        })
    }

    fn invoke(&mut self, action: &BuildAction, tool_args: &[String], process_args: &[String]) -> anyhow::Result<WorkerReport> {
        self.pid.clear()?;
        let request = BuildRequest {
            tasks: action.tasks().to_vec(),
            tool_args: tool_args.to_vec(),
            process_args: process_args.to_vec(),
            env: vec![self.pid.env()],
        };
        let outcome = self.client.run(&request);
        let report = self.pid.read();

        let killed = match (&report, self.kill_after_invocation) {
            (Ok(WorkerReport { worker: Some(worker), .. }), true) => self
                .toolchain
                .kill_worker(worker)
                .with_context(|| format!("Failed to stop worker {worker} after the build")),
            _ => Ok(()),
        };

        outcome?;
        killed?;
        report
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        self.client.close()
    }
}

impl Drop for BuildUnderTest<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("Failed to close build client: {e:?}");
            }
        }
    }
}

/// Gives mutators their `after_scenario` call on every exit path.
struct ScenarioMutator {
    mutator: Box<dyn Mutator>,
    context: ScenarioContext,
    finished: bool,
}

impl ScenarioMutator {
    fn new(mutator: Box<dyn Mutator>, context: ScenarioContext) -> Self {
        Self {
            mutator,
            context,
            finished: false,
        }
    }

    fn finish(mut self) -> HookResult {
        self.finished = true;
        self.mutator.after_scenario(&self.context)
    }
}

impl Drop for ScenarioMutator {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.mutator.after_scenario(&self.context) {
                log::error!("Mutator {} failed in after_scenario: {e:?}", self.mutator);
            }
        }
    }
}

pub(crate) struct PairInvoker<'a> {
    context: &'a RunContext,
    scenario: &'a ScenarioDefinition,
    build: &'a BuildConfiguration,
}

impl<'a> PairInvoker<'a> {
    pub(crate) fn new(
        context: &'a RunContext,
        scenario: &'a ScenarioDefinition,
        build: &'a BuildConfiguration,
    ) -> Self {
        Self {
            context,
            scenario,
            build,
        }
    }

    /// Every result of the pair, warm-ups first. Nothing is returned unless the whole pair succeeded.
    pub(crate) fn run(&self, progress: &Progress) -> anyhow::Result<Vec<BuildInvocationResult>> {
        let settings = self.context.settings();
        let scenario = self.scenario;
        let project_dir = settings.project_dir.as_path();
        let toolchain = self.context.toolchain();
        let kind = scenario.invoker.transport_kind();

        toolchain
            .stop_workers(self.build, project_dir)
            .context("Failed to stop workers before the scenario")?;
        let _stop_workers = StopWorkersOnExit {
            toolchain,
            build: self.build,
            project_dir,
        };

        let args = PairArgs::resolve(settings, scenario, self.build);
        let mut target = ProfilerTarget {
            scenario_name: scenario.name.clone(),
            version: self.build.version.clone(),
            output_dir: scenario.output_dir_for(self.build),
            project_dir: settings.project_dir.clone(),
            worker: None,
            executor: self.context.executor().clone(),
            sink: self.context.sink().clone(),
        };
        let plan = settings
            .profiler
            .as_deref()
            .map(|profiler| instrumentation_plan(profiler, kind, &target))
            .unwrap_or_default();
        let InstrumentationPlan {
            all_builds,
            measured_builds,
        } = plan;
        let warm_up_process_args = [args.process_args.as_slice(), all_builds.as_slice()].concat();
        let measured_process_args = [warm_up_process_args.as_slice(), measured_builds.as_slice()].concat();
        log::debug!("Process arguments: {}", warm_up_process_args.join(" "));
        log::debug!("Tool arguments: {}", args.tool_args.join(" "));

        let client = toolchain
            .client(self.build, scenario.invoker, project_dir)
            .with_context(|| format!("Failed to reach build tool {}", self.build.version))?;
        let mut build_under_test = BuildUnderTest::new(toolchain, client, kind)?;

        let scenario_context = ScenarioContext::new(self.context.invocation_id().clone(), &scenario.name);
        let mut mutator = ScenarioMutator::new(scenario.create_mutator()?, scenario_context.clone());
        mutator.mutator.before_scenario(&scenario_context)?;

        let mut identity = WorkerIdentityCheck::new(kind);
        let mut results = Vec::with_capacity(scenario.warm_up_count + scenario.build_count);
        let mut steps = Steps {
            scenario,
            build_under_test: &mut build_under_test,
            mutator: mutator.mutator.as_mut(),
            tool_args: &args.tool_args,
            cleanup_process_args: &warm_up_process_args,
        };

        for iteration in 1..=scenario.warm_up_count {
            let build_context = scenario_context.with_build(Phase::WarmUp, iteration);
            steps.cleanup(&build_context)?;
            let result = steps.build(&build_context, &warm_up_process_args, &mut NoRecording)?;
            identity.check(result.worker_id())?;
            progress.build_finished(&result);
            results.push(result);
        }

        target.worker = identity.baseline().cloned();
        let mut controller: Box<dyn ProfilerController> = match settings.profiler.as_deref() {
            Some(profiler) => controller_for(profiler, kind, &target)?,
            None => Box::new(NoOpController),
        };

        // Scenario constant: the cleanup action never changes between iterations.
        let record_every_build = scenario.cleanup.does_something();
        controller.start_session()?;
        for iteration in 1..=scenario.build_count {
            let build_context = scenario_context.with_build(Phase::Measure, iteration);
            steps.cleanup(&build_context)?;
            let mut recording = Recording {
                controller: controller.as_mut(),
                start: iteration == 1 || record_every_build,
                stop: iteration == scenario.build_count || record_every_build,
            };
            let result = steps.build(&build_context, &measured_process_args, &mut recording)?;
            identity.check(result.worker_id())?;
            progress.build_finished(&result);
            results.push(result);
        }
        controller.stop_session()?;

        mutator.finish()?;
        build_under_test.close()?;
        Ok(results)
    }
}

/// Profiler calls made around a single build.
trait RecordingBracket {
    fn before(&mut self) -> HookResult;

    fn after(&mut self, result: &BuildInvocationResult) -> HookResult;
}

struct NoRecording;

impl RecordingBracket for NoRecording {
    fn before(&mut self) -> HookResult {
        Ok(())
    }

    fn after(&mut self, _result: &BuildInvocationResult) -> HookResult {
        Ok(())
    }
}

struct Recording<'c> {
    controller: &'c mut dyn ProfilerController,
    start: bool,
    stop: bool,
}

impl RecordingBracket for Recording<'_> {
    fn before(&mut self) -> HookResult {
        if self.start {
            self.controller.start_recording()?;
        }
        Ok(())
    }

    fn after(&mut self, result: &BuildInvocationResult) -> HookResult {
        if self.stop {
            self.controller.stop_recording(result.worker_id())?;
        }
        Ok(())
    }
}

/// The cleanup and build steps of one iteration.
struct Steps<'s, 'b, 't> {
    scenario: &'s ScenarioDefinition,
    build_under_test: &'b mut BuildUnderTest<'t>,
    mutator: &'b mut dyn Mutator,
    tool_args: &'s [String],
    cleanup_process_args: &'s [String],
}

impl Steps<'_, '_, '_> {
    fn cleanup(&mut self, context: &BuildContext) -> HookResult {
        if !self.scenario.cleanup.does_something() {
            return Ok(());
        }
        log::info!("{}: cleanup", context.display_name());
        self.mutator.before_cleanup(context)?;
        let outcome = self.build_under_test.invoke(
            &self.scenario.cleanup,
            self.tool_args,
            self.cleanup_process_args,
        );
        let after = self.mutator.after_cleanup(context, outcome.as_ref().err());
        outcome.with_context(|| format!("Cleanup before {} failed", context.display_name()))?;
        after
    }

    fn build(
        &mut self,
        context: &BuildContext,
        process_args: &[String],
        recording: &mut dyn RecordingBracket,
    ) -> anyhow::Result<BuildInvocationResult> {
        self.mutator.before_build(context)?;

        let outcome = recording.before().and_then(|()| {
            let operation = OperationRecord::new(context.unique_build_id());
            let report = self
                .build_under_test
                .invoke(&self.scenario.action, self.tool_args, process_args);
            let elapsed = operation.finish(&report);
            let report = report?;
            let result = BuildInvocationResult::new(context, elapsed, report.worker, report.timings);
            recording.after(&result)?;
            Ok(result)
        });

        let after = self.mutator.after_build(context, outcome.as_ref().err());
        let result = outcome.with_context(|| format!("{} failed", context.display_name()))?;
        after?;
        log::info!(
            "{}: {}ms",
            result.display_name(),
            result.execution_time().as_millis()
        );
        Ok(result)
    }
}
