mod cli;
mod config;

use anyhow::Context;
use build_profiler_runner::prelude::{run, InvocationSettings, RunContext};
use clap::Parser;

pub use cli::BuildProfilerCli;
pub use config::{
    BuildConfig, InvokerConfig, MutatorConfig, ProfilerConfig, ScenarioConfig, ScenarioFile,
    ScheduleConfig,
};

/// Initialise logging and parse the command line.
pub fn init() -> BuildProfilerCli {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    BuildProfilerCli::parse()
}

/// Runs the scenarios selected on the command line. Fails when any of them failed, after the
/// results of the others have been written.
pub fn execute(cli: BuildProfilerCli) -> anyhow::Result<()> {
    cli.check_mode()?;
    let file = ScenarioFile::load(&cli.scenario_file)?;

    let mut settings = InvocationSettings::new(&cli.project_dir, &cli.output_dir);
    settings.profiler = file.profiler(&cli.profilers)?;
    settings.benchmark = cli.benchmark;
    settings.dry_run = cli.dry_run;
    settings.warm_up_count = cli.warmups;
    settings.build_count = cli.iterations;
    settings.system_properties = cli.system_property_map();
    settings.build_log = cli.build_log.clone();
    settings.show_progress = !cli.no_progress;

    let context = RunContext::new(settings)?;
    let scenarios = file.definitions(&cli.scenarios, &context)?;
    let outcome = run(&context, &scenarios)?;
    log::info!(
        "Results written to {}",
        cli.output_dir.join("benchmark.json").display()
    );

    outcome
        .into_result()
        .map(|_| ())
        .context("Not every scenario completed")
}
