use std::sync::Arc;

use build_profiler_core::prelude::WorkerId;

use crate::definition::ScenarioDefinition;
use crate::profiler::{Profiler, ProfilerController, ProfilerTarget, RecordingOptions};
use crate::types::HookResult;

/// Runs several profilers at once.
#[derive(Debug)]
pub struct CompositeProfiler {
    name: String,
    profilers: Vec<Arc<dyn Profiler>>,
}

impl CompositeProfiler {
    pub fn new(profilers: Vec<Arc<dyn Profiler>>) -> Self {
        let name = profilers
            .iter()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, profilers }
    }
}

impl Profiler for CompositeProfiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_restart_recording(&self) -> bool {
        self.profilers.iter().all(|p| p.can_restart_recording())
    }

    fn validate(&self, scenario: &ScenarioDefinition) -> Vec<String> {
        self.profilers
            .iter()
            .flat_map(|p| p.validate(scenario))
            .collect()
    }

    fn instrumentation_args(&self, target: &ProfilerTarget, options: RecordingOptions) -> Vec<String> {
        self.profilers
            .iter()
            .flat_map(|p| p.instrumentation_args(target, options))
            .collect()
    }

    fn new_controller(&self, target: &ProfilerTarget) -> anyhow::Result<Box<dyn ProfilerController>> {
        let controllers = self
            .profilers
            .iter()
            .map(|p| p.new_controller(target))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Box::new(CompositeController { controllers }))
    }
}

struct CompositeController {
    controllers: Vec<Box<dyn ProfilerController>>,
}

impl ProfilerController for CompositeController {
    fn start_session(&mut self) -> HookResult {
        self.controllers.iter_mut().try_for_each(|c| c.start_session())
    }

    fn start_recording(&mut self) -> HookResult {
        self.controllers
            .iter_mut()
            .try_for_each(|c| c.start_recording())
    }

    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult {
        self.controllers
            .iter_mut()
            .try_for_each(|c| c.stop_recording(worker))
    }

    fn stop_session(&mut self) -> HookResult {
        self.controllers.iter_mut().try_for_each(|c| c.stop_session())
    }
}
