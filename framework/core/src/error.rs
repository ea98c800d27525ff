use crate::context::WorkerId;

/// A check on the harness' own assumptions failed. The pair being executed is aborted.
#[derive(Debug, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Multiple build workers were used: expected all builds to run in worker {expected} but one ran in worker {actual}")]
    MultipleWorkers { expected: WorkerId, actual: WorkerId },
    #[error("Build worker {worker} was reused but should not be reused")]
    WorkerReused { worker: WorkerId },
    #[error("{mutator} is not allowed to be executed between builds with invoker {invoker}")]
    UnsupportedMutator { mutator: String, invoker: String },
    #[error("Recording multiple iterations with cleanup runs in between is not supported by profiler {profiler}")]
    ProfilerCannotRestart { profiler: String },
}

/// Launching or talking to the build tool failed. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Could not run command `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Build failed: `{command}` exited with {status}")]
    NonZeroExit { command: String, status: String },
    #[error("Lost connection to build worker: {reason}")]
    Connection { reason: String },
}

/// Everything wrong with the requested scenarios, reported before any build is started.
#[derive(Debug, thiserror::Error)]
#[error("Invalid configuration:\n  {}", .problems.join("\n  "))]
pub struct ValidationError {
    pub problems: Vec<String>,
}

/// One (scenario, version) pair that did not complete.
#[derive(Debug, Clone)]
pub struct PairFailure {
    pub scenario: String,
    pub version: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{} of {attempted} scenario runs failed: {}", .failures.len(), describe(.failures))]
pub struct ScenarioFailures {
    pub attempted: usize,
    pub failures: Vec<PairFailure>,
}

fn describe(failures: &[PairFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} using {}", f.scenario, f.version))
        .collect::<Vec<_>>()
        .join(", ")
}
