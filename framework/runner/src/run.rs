use anyhow::Context;
use build_profiler_core::prelude::{PairFailure, RunInterrupted, ScenarioFailures};
use build_profiler_instruments::prelude::ReportConfig;
use build_profiler_summary_model::{
    BenchmarkResultCollector, BenchmarkSummary, BuildScenarioResult, ScenarioDescriptor,
};

use crate::build_config::BuildConfiguration;
use crate::context::RunContext;
use crate::definition::ScenarioDefinition;
use crate::invoker::{PairArgs, PairInvoker};
use crate::monitor::warn_if_host_busy;
use crate::progress::Progress;
use crate::validate::validate_scenarios;

/// Everything a run produced, including the pairs that failed.
#[derive(Debug)]
pub struct RunOutcome {
    results: BenchmarkResultCollector,
    summary: BenchmarkSummary,
    failures: Vec<PairFailure>,
    attempted: usize,
}

impl RunOutcome {
    pub fn results(&self) -> &BenchmarkResultCollector {
        &self.results
    }

    pub fn summary(&self) -> &BenchmarkSummary {
        &self.summary
    }

    pub fn failures(&self) -> &[PairFailure] {
        &self.failures
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Fails with [ScenarioFailures] when any pair did not complete.
    pub fn into_result(self) -> anyhow::Result<BenchmarkResultCollector> {
        if self.failures.is_empty() {
            Ok(self.results)
        } else {
            Err(ScenarioFailures {
                attempted: self.attempted,
                failures: self.failures,
            }
            .into())
        }
    }
}

fn descriptor(
    context: &RunContext,
    scenario: &ScenarioDefinition,
    build: &BuildConfiguration,
) -> ScenarioDescriptor {
    let args = PairArgs::resolve(context.settings(), scenario, build);
    ScenarioDescriptor {
        name: scenario.name.clone(),
        title: scenario.display_name().to_string(),
        version: build.version.clone(),
        warm_up_count: scenario.warm_up_count,
        build_count: scenario.build_count,
        tasks: scenario.action.tasks().to_vec(),
        tool_args: args.tool_args,
        process_args: args.process_args,
        system_properties: args.system_properties,
    }
}

/// Runs every scenario against each of its build configurations, one pair after the other.
///
/// Invalid scenarios fail the run before any build starts. After that, a failing pair is recorded
/// and the remaining pairs still run. Once interrupted, no further pair is started. The reports
/// are written in every case; check [RunOutcome::into_result] for failures.
pub fn run(context: &RunContext, scenarios: &[ScenarioDefinition]) -> anyhow::Result<RunOutcome> {
    let settings = context.settings();
    validate_scenarios(settings, scenarios)?;

    let pairs = scenarios
        .iter()
        .flat_map(|scenario| scenario.builds.iter().map(move |build| (scenario, build)))
        .collect::<Vec<_>>();
    let planned_builds = pairs
        .iter()
        .map(|(scenario, _)| (scenario.warm_up_count + scenario.build_count) as u64)
        .sum();
    log::info!(
        "Running {} scenario(s), {} build(s) in total",
        pairs.len(),
        planned_builds
    );

    if !settings.dry_run {
        warn_if_host_busy();
    }

    let started_at = chrono::Utc::now();
    let progress = Progress::new(planned_builds, settings.show_progress);
    let interrupt = context.interrupt_handle().new_listener();
    let mut collector = BenchmarkResultCollector::new();
    let mut failures = Vec::new();

    for (scenario, build) in &pairs {
        let descriptor = descriptor(context, scenario, build);
        let samples = scenario.samples();
        let failure = |message: String| PairFailure {
            scenario: scenario.display_name().to_string(),
            version: build.version.clone(),
            message,
        };

        if interrupt.is_interrupted() {
            let message = RunInterrupted::default().to_string();
            log::warn!("{message}: {} using {}", scenario.display_name(), build.version);
            failures.push(failure(message.clone()));
            collector.push(BuildScenarioResult::failed(descriptor, samples, message));
            continue;
        }

        log::info!(
            "Running scenario {} using {}",
            scenario.display_name(),
            build.version
        );
        let start = progress.begin_pair(scenario.display_name(), &build.version);
        match PairInvoker::new(context, scenario, build).run(&progress) {
            Ok(results) => {
                let mut result = BuildScenarioResult::new(descriptor, samples);
                results.into_iter().for_each(|r| result.accept(r));
                collector.push(result);
            }
            Err(e) => {
                log::error!(
                    "Scenario {} using {} failed: {e:?}",
                    scenario.display_name(),
                    build.version
                );
                let message = format!("{e:#}");
                failures.push(failure(message.clone()));
                collector.push(BuildScenarioResult::failed(descriptor, samples, message));
            }
        }
        progress.end_pair(
            start,
            (scenario.warm_up_count + scenario.build_count) as u64,
        );
    }
    progress.finish();

    let summary = BenchmarkSummary::from_collector(
        context.invocation_id().to_string(),
        started_at.timestamp(),
        chrono::Utc::now().timestamp(),
        &collector,
    );

    let mut report_config = ReportConfig::default().enable_json_summary(&settings.output_dir);
    if settings.console_summary && settings.benchmark {
        report_config = report_config.enable_console_summary();
    }
    report_config
        .init()
        .finalize(&summary)
        .context("Failed to write reports")?;

    Ok(RunOutcome {
        results: collector,
        summary,
        failures,
        attempted: pairs.len(),
    })
}
