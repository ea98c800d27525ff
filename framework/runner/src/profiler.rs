mod command;
mod composite;
mod controller;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use build_profiler_core::prelude::WorkerId;

use crate::definition::ScenarioDefinition;
use crate::exec::OutputSink;
use crate::executor::Executor;
use crate::transport::TransportKind;

pub use command::{CommandProfiler, CommandProfilerConfig};
pub use composite::CompositeProfiler;
pub use controller::{
    controller_for, ControllerShape, NoOpController, ProfilerController, RestartGuard,
    ShapedController,
};

/// Options for instrumenting a worker that is profiled from the moment it starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Begin recording as soon as the worker launches.
    pub start_on_launch: bool,
    /// Write the recording out when the worker exits.
    pub capture_on_exit: bool,
}

/// Everything a profiler needs to know about the pair it profiles.
#[derive(Debug, Clone)]
pub struct ProfilerTarget {
    pub scenario_name: String,
    pub version: String,
    /// Profiler output for this pair is written here.
    pub output_dir: PathBuf,
    pub project_dir: PathBuf,
    /// The worker of the first warm-up, when known.
    pub worker: Option<WorkerId>,
    pub executor: Arc<Executor>,
    pub sink: OutputSink,
}

pub trait Profiler: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether recording may be started again after it was stopped within one session.
    fn can_restart_recording(&self) -> bool {
        true
    }

    /// Problems with profiling this scenario.
    fn validate(&self, _scenario: &ScenarioDefinition) -> Vec<String> {
        Vec::new()
    }

    /// Arguments for the worker process that enable this profiler.
    fn instrumentation_args(&self, target: &ProfilerTarget, options: RecordingOptions) -> Vec<String>;

    fn new_controller(&self, target: &ProfilerTarget) -> anyhow::Result<Box<dyn ProfilerController>>;
}

/// Process arguments for warm-ups and for measured builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationPlan {
    /// Added to every build.
    pub all_builds: Vec<String>,
    /// Added to measured builds only.
    pub measured_builds: Vec<String>,
}

/// A reused worker is instrumented from the first warm-up on and recording is switched on later
/// through the controller. A cold worker only exists for one build, so only measured builds are
/// instrumented, recording from launch.
pub fn instrumentation_plan(
    profiler: &dyn Profiler,
    kind: TransportKind,
    target: &ProfilerTarget,
) -> InstrumentationPlan {
    match kind {
        TransportKind::ReusedWorker => InstrumentationPlan {
            all_builds: profiler.instrumentation_args(target, RecordingOptions::default()),
            measured_builds: Vec::new(),
        },
        TransportKind::ColdWorkerPerInvocation | TransportKind::ColdThenKill => {
            InstrumentationPlan {
                all_builds: Vec::new(),
                measured_builds: profiler.instrumentation_args(
                    target,
                    RecordingOptions {
                        start_on_launch: true,
                        capture_on_exit: kind == TransportKind::ColdWorkerPerInvocation,
                    },
                ),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    pub(crate) struct ArgsProfiler;

    impl Profiler for ArgsProfiler {
        fn name(&self) -> &str {
            "args"
        }

        fn instrumentation_args(&self, _target: &ProfilerTarget, options: RecordingOptions) -> Vec<String> {
            vec![format!(
                "-agent:start={},capture={}",
                options.start_on_launch, options.capture_on_exit
            )]
        }

        fn new_controller(&self, _target: &ProfilerTarget) -> anyhow::Result<Box<dyn ProfilerController>> {
            Ok(Box::new(NoOpController))
        }
    }

    pub(crate) fn target() -> ProfilerTarget {
        ProfilerTarget {
            scenario_name: "s".to_string(),
            version: "1".to_string(),
            output_dir: PathBuf::from("out"),
            project_dir: PathBuf::from("."),
            worker: None,
            executor: Arc::new(Executor::new().unwrap()),
            sink: OutputSink::default(),
        }
    }

    #[test]
    fn reused_worker_is_instrumented_for_all_builds() {
        let plan = instrumentation_plan(&ArgsProfiler, TransportKind::ReusedWorker, &target());
        assert_eq!(vec!["-agent:start=false,capture=false"], plan.all_builds);
        assert!(plan.measured_builds.is_empty());
    }

    #[test]
    fn cold_workers_record_from_launch() {
        let plan = instrumentation_plan(
            &ArgsProfiler,
            TransportKind::ColdWorkerPerInvocation,
            &target(),
        );
        assert!(plan.all_builds.is_empty());
        assert_eq!(vec!["-agent:start=true,capture=true"], plan.measured_builds);

        let plan = instrumentation_plan(&ArgsProfiler, TransportKind::ColdThenKill, &target());
        assert_eq!(vec!["-agent:start=true,capture=false"], plan.measured_builds);
    }
}
