use std::collections::BTreeMap;
use std::time::Duration;

use build_profiler_core::prelude::{BuildContext, Phase, WorkerId};
use serde::{Deserialize, Serialize};

/// The outcome of one build invocation. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInvocationResult {
    display_name: String,
    phase: Phase,
    iteration: usize,
    execution_time: Duration,
    worker_id: Option<WorkerId>,
    timings: BTreeMap<String, Duration>,
}

impl BuildInvocationResult {
    pub fn new(
        context: &BuildContext,
        execution_time: Duration,
        worker_id: Option<WorkerId>,
        timings: BTreeMap<String, Duration>,
    ) -> Self {
        Self {
            display_name: context.display_name(),
            phase: context.phase(),
            iteration: context.iteration(),
            execution_time,
            worker_id,
            timings,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn worker_id(&self) -> Option<&WorkerId> {
        self.worker_id.as_ref()
    }

    pub fn timings(&self) -> &BTreeMap<String, Duration> {
        &self.timings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    ExecutionTime,
    /// A secondary timing reported by the build through the instrumentation side channel.
    Timing(String),
}

/// A named measurement extracted from every result, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    name: String,
    source: SampleSource,
}

impl Sample {
    pub fn execution_time() -> Self {
        Self {
            name: "execution".to_string(),
            source: SampleSource::ExecutionTime,
        }
    }

    pub fn timing(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: SampleSource::Timing(name.clone()),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }

    pub fn extract(&self, result: &BuildInvocationResult) -> Option<f64> {
        match &self.source {
            SampleSource::ExecutionTime => Some(millis(result.execution_time)),
            SampleSource::Timing(name) => result.timings.get(name).map(|d| millis(*d)),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
