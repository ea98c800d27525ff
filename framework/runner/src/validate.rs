use build_profiler_core::prelude::ValidationError;
use itertools::Itertools;

use crate::definition::ScenarioDefinition;
use crate::settings::InvocationSettings;
use crate::transport::{BuildInvoker, TransportKind};

/// Checks every scenario before any build is started, so that a bad configuration is reported in
/// full instead of failing half way through a run.
pub fn validate_scenarios(
    settings: &InvocationSettings,
    scenarios: &[ScenarioDefinition],
) -> Result<(), ValidationError> {
    let mut problems = Vec::new();

    if scenarios.is_empty() {
        problems.push("No scenarios to run".to_string());
    }
    for name in scenarios.iter().map(|s| s.name.as_str()).duplicates() {
        problems.push(format!("Scenario '{name}' is defined more than once"));
    }

    for scenario in scenarios {
        problems.extend(validate_scenario(settings, scenario));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { problems })
    }
}

fn validate_scenario(settings: &InvocationSettings, scenario: &ScenarioDefinition) -> Vec<String> {
    let name = scenario.display_name();
    let mut problems = Vec::new();

    if scenario.builds.is_empty() {
        problems.push(format!("Scenario '{name}' has no build configuration to run against"));
    }
    for version in scenario.builds.iter().map(|b| b.version.as_str()).duplicates() {
        problems.push(format!("Scenario '{name}' uses version '{version}' more than once"));
    }
    if scenario.build_count == 0 {
        problems.push(format!("Scenario '{name}' must run at least one measured build"));
    }
    if scenario.invoker == BuildInvoker::Connection {
        for build in scenario.builds.iter().filter(|b| b.server_args.is_empty()) {
            problems.push(format!(
                "Scenario '{name}' uses a {} but version '{}' has no server arguments",
                scenario.invoker, build.version
            ));
        }
    }

    match scenario.create_mutator() {
        Ok(mutator) => {
            if let Err(e) = mutator.validate(scenario.invoker) {
                problems.push(format!("Scenario '{name}': {e}"));
            }
        }
        Err(e) => problems.push(format!("Scenario '{name}': {e:#}")),
    }

    if let Some(profiler) = settings.profiler.as_deref() {
        if scenario.warm_up_count == 0 {
            problems.push(format!(
                "Scenario '{name}': profiling with {} requires at least one warm-up",
                profiler.name()
            ));
        }
        problems.extend(
            profiler
                .validate(scenario)
                .into_iter()
                .map(|p| format!("Scenario '{name}': {p}")),
        );

        let records_every_build = scenario.cleanup.does_something() && scenario.build_count > 1;
        if records_every_build
            && !profiler.can_restart_recording()
            && scenario.invoker.transport_kind() == TransportKind::ReusedWorker
        {
            problems.push(format!(
                "Scenario '{name}': profiler {} does not support profiling multiple iterations with cleanup steps in between",
                profiler.name()
            ));
        }
    }

    problems
}
