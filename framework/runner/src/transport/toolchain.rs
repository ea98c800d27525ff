use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use build_profiler_core::prelude::WorkerId;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::build_config::BuildConfiguration;
use crate::exec::{CommandExec, OutputSink};
use crate::executor::Executor;
use crate::transport::{BuildClient, BuildInvoker, BuildToolchain, CliClient, ConnectionClient};

const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Reaches the build tool by launching its executable.
pub struct CommandLineToolchain {
    executor: Arc<Executor>,
    sink: OutputSink,
}

impl CommandLineToolchain {
    pub fn new(executor: Arc<Executor>, sink: OutputSink) -> Self {
        Self { executor, sink }
    }
}

impl BuildToolchain for CommandLineToolchain {
    fn client(
        &self,
        build: &BuildConfiguration,
        invoker: BuildInvoker,
        project_dir: &Path,
    ) -> anyhow::Result<Box<dyn BuildClient>> {
        let tool = build.resolve_tool()?;
        let project_dir = project_dir.to_path_buf();
        Ok(match invoker {
            BuildInvoker::Connection => Box::new(ConnectionClient::new(
                self.executor.clone(),
                self.sink.clone(),
                build,
                tool,
                project_dir,
            )),
            BuildInvoker::Cli | BuildInvoker::CliColdWorker => Box::new(CliClient::new(
                self.executor.clone(),
                self.sink.clone(),
                build,
                tool,
                project_dir,
                true,
            )),
            BuildInvoker::CliNoWorker => Box::new(CliClient::new(
                self.executor.clone(),
                self.sink.clone(),
                build,
                tool,
                project_dir,
                false,
            )),
        })
    }

    fn stop_workers(&self, build: &BuildConfiguration, project_dir: &Path) -> anyhow::Result<()> {
        if build.stop_workers_args.is_empty() {
            return Ok(());
        }
        let command: Vec<String> = std::iter::once(build.resolve_tool()?.display().to_string())
            .chain(build.stop_workers_args.iter().cloned())
            .collect();
        log::info!("Stopping build workers of {}", build.version);
        let exec = CommandExec::new(self.sink.clone())
            .in_dir(project_dir)
            .envs(build.env.clone());
        self.executor
            .execute_in_place(exec.run(&command))
            .with_context(|| format!("Failed to stop build workers of {}", build.version))
    }

    fn kill_worker(&self, worker: &WorkerId) -> anyhow::Result<()> {
        let Some(raw_pid) = worker.as_pid() else {
            bail!("Cannot kill worker '{worker}', it is not identified by a process id");
        };
        let pid = Pid::from_u32(raw_pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = sys.process(pid) else {
            log::debug!("Worker {worker} already stopped");
            return Ok(());
        };

        log::debug!("Killing worker {worker}");
        if !process.kill() {
            bail!("Failed to kill worker {worker}");
        }

        let deadline = Instant::now() + KILL_TIMEOUT;
        while Instant::now() < deadline {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if sys.process(pid).is_none() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        bail!("Worker {worker} did not stop within {KILL_TIMEOUT:?}")
    }
}
