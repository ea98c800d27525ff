mod cli_client;
mod connection_client;
mod identity;
mod pid;
mod toolchain;

use std::path::Path;

use build_profiler_core::prelude::WorkerId;

use crate::build_config::BuildConfiguration;

pub use cli_client::CliClient;
pub use connection_client::{ConnectionClient, WorkerRequest, WorkerResponse};
pub use identity::WorkerIdentityCheck;
pub use pid::{PidInstrumentation, WorkerReport, PID_FILE_ENV};
pub use toolchain::CommandLineToolchain;

/// How builds are launched, as chosen in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum BuildInvoker {
    /// Command line, with a reusable worker.
    #[default]
    #[display("command line")]
    Cli,
    /// A persistent connection to a long-lived worker server.
    #[display("persistent connection")]
    Connection,
    /// Command line, with no worker kept between builds.
    #[display("command line without worker")]
    CliNoWorker,
    /// Command line with a worker that is killed after every build.
    #[display("command line with cold worker")]
    CliColdWorker,
}

/// What happens to the worker process between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    ReusedWorker,
    ColdWorkerPerInvocation,
    ColdThenKill,
}

impl BuildInvoker {
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            BuildInvoker::Cli | BuildInvoker::Connection => TransportKind::ReusedWorker,
            BuildInvoker::CliNoWorker => TransportKind::ColdWorkerPerInvocation,
            BuildInvoker::CliColdWorker => TransportKind::ColdThenKill,
        }
    }

    pub fn reuses_worker(&self) -> bool {
        self.transport_kind() == TransportKind::ReusedWorker
    }

    /// A warm worker keeps state open between builds, so nothing may change underneath it.
    pub fn allows_mutation_between_builds(&self) -> bool {
        !self.reuses_worker()
    }

    pub fn benchmark_warm_ups(&self) -> usize {
        if self.reuses_worker() {
            6
        } else {
            1
        }
    }

    pub fn profile_warm_ups(&self) -> usize {
        if self.reuses_worker() {
            2
        } else {
            1
        }
    }
}

/// One invocation of the build tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildRequest {
    pub tasks: Vec<String>,
    pub tool_args: Vec<String>,
    pub process_args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Runs builds for one (scenario, version) pair. Failures are reported, never retried.
pub trait BuildClient: Send {
    fn run(&mut self, request: &BuildRequest) -> anyhow::Result<()>;

    /// Release any connection or process held by the client.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Knows how to reach the build tool of a [BuildConfiguration].
pub trait BuildToolchain: Send + Sync {
    fn client(
        &self,
        build: &BuildConfiguration,
        invoker: BuildInvoker,
        project_dir: &Path,
    ) -> anyhow::Result<Box<dyn BuildClient>>;

    /// Stop every worker of this configuration so that a pair starts from a known state.
    fn stop_workers(&self, build: &BuildConfiguration, project_dir: &Path) -> anyhow::Result<()>;

    fn kill_worker(&self, worker: &WorkerId) -> anyhow::Result<()>;
}

/// Quote process arguments for an environment variable, the way a JVM style launcher splits them.
pub(crate) fn join_process_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reused_workers_get_more_than_one_warm_up() {
        assert_eq!(6, BuildInvoker::Cli.benchmark_warm_ups());
        assert_eq!(2, BuildInvoker::Connection.profile_warm_ups());
        for cold in [BuildInvoker::CliNoWorker, BuildInvoker::CliColdWorker] {
            assert_eq!(1, cold.benchmark_warm_ups());
            assert_eq!(1, cold.profile_warm_ups());
            assert!(cold.allows_mutation_between_builds());
        }
        assert!(!BuildInvoker::Cli.allows_mutation_between_builds());
    }

    #[test]
    fn transport_kinds() {
        assert_eq!(TransportKind::ReusedWorker, BuildInvoker::Connection.transport_kind());
        assert_eq!(
            TransportKind::ColdWorkerPerInvocation,
            BuildInvoker::CliNoWorker.transport_kind()
        );
        assert_eq!(TransportKind::ColdThenKill, BuildInvoker::CliColdWorker.transport_kind());
    }

    #[test]
    fn process_args_with_spaces_are_quoted() {
        let args = vec!["-Xmx1g".to_string(), "-Dname=a b".to_string()];
        assert_eq!("-Xmx1g \"-Dname=a b\"", join_process_args(&args));
    }
}
