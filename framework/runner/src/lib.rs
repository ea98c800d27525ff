mod build_config;
mod context;
mod definition;
mod exec;
mod executor;
mod invoker;
mod monitor;
mod mutator;
mod profiler;
mod progress;
mod run;
mod settings;
mod shutdown;
mod transport;
mod types;
mod validate;

pub mod prelude {
    pub use crate::build_config::{BuildConfiguration, DEFAULT_PROCESS_ARGS_ENV};
    pub use crate::context::RunContext;
    pub use crate::definition::{BuildAction, ScenarioDefinition, ScenarioDefinitionBuilder};
    pub use crate::exec::{CommandExec, OutputSink, RunHandle, DRAIN_TIMEOUT};
    pub use crate::executor::Executor;
    pub use crate::invoker::{PairArgs, SCENARIO_PROPERTY};
    pub use crate::mutator::{
        ApplyFileChangeMutator, ClearDirectory, ClearDirectoryMutator, CompositeMutator,
        ExecuteCommand, ExecuteCommandMutator, FileChange, Mutator, MutatorFactory, NoOpMutator,
        ReportDirectorySizeMutator, Schedule, ScheduledAction, ScheduledMutator,
    };
    pub use crate::profiler::{
        controller_for, instrumentation_plan, CommandProfiler, CommandProfilerConfig,
        CompositeProfiler, ControllerShape, InstrumentationPlan, NoOpController, Profiler,
        ProfilerController, ProfilerTarget, RecordingOptions, RestartGuard, ShapedController,
    };
    pub use crate::run::{run, RunOutcome};
    pub use crate::settings::InvocationSettings;
    pub use crate::transport::{
        BuildClient, BuildInvoker, BuildRequest, BuildToolchain, CliClient, CommandLineToolchain,
        ConnectionClient, PidInstrumentation, TransportKind, WorkerIdentityCheck, WorkerReport,
        WorkerRequest, WorkerResponse, PID_FILE_ENV,
    };
    pub use crate::types::{BuildProfilerResult, HookResult};
    pub use crate::validate::validate_scenarios;
}
