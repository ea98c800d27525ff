use std::path::PathBuf;
use std::sync::Arc;

use crate::build_config::BuildConfiguration;
use crate::exec::{CommandExec, OutputSink};
use crate::executor::Executor;
use crate::transport::{join_process_args, BuildClient, BuildRequest};

/// Runs every build as a new invocation of the tool's command line.
pub struct CliClient {
    executor: Arc<Executor>,
    exec: CommandExec,
    tool: PathBuf,
    mode_args: Vec<String>,
    process_args_env: String,
}

impl CliClient {
    pub fn new(
        executor: Arc<Executor>,
        sink: OutputSink,
        build: &BuildConfiguration,
        tool: PathBuf,
        project_dir: PathBuf,
        reuse_worker: bool,
    ) -> Self {
        let mode_args = if reuse_worker {
            build.reuse_worker_args.clone()
        } else {
            build.no_worker_args.clone()
        };
        Self {
            executor,
            exec: CommandExec::new(sink)
                .in_dir(project_dir)
                .envs(build.env.clone()),
            tool,
            mode_args,
            process_args_env: build.process_args_env.clone(),
        }
    }

    pub(crate) fn command_line(&self, request: &BuildRequest) -> Vec<String> {
        std::iter::once(self.tool.display().to_string())
            .chain(self.mode_args.iter().cloned())
            .chain(request.tool_args.iter().cloned())
            .chain(request.tasks.iter().cloned())
            .collect()
    }
}

impl BuildClient for CliClient {
    fn run(&mut self, request: &BuildRequest) -> anyhow::Result<()> {
        let command = self.command_line(request);
        let mut exec = self.exec.clone().envs(request.env.clone());
        if !request.process_args.is_empty() {
            exec = exec.env(
                self.process_args_env.clone(),
                join_process_args(&request.process_args),
            );
        }
        self.executor.execute_in_place(exec.run(&command))
    }
}
