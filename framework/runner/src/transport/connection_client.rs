//! Talks to a long-lived worker server over its stdin and stdout.
//!
//! The server prints `{"status":"ready"}` once it accepts requests. Each request is one JSON line,
//! answered by one JSON status line. Any other output is treated as build output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use build_profiler_core::prelude::TransportError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::build_config::BuildConfiguration;
use crate::exec::{drain, join_drains, OutputSink, DRAIN_TIMEOUT};
use crate::executor::Executor;
use crate::transport::{join_process_args, BuildClient, BuildRequest};

const READY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRequest {
    pub tasks: Vec<String>,
    pub args: Vec<String>,
    pub process_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready,
    Success,
    Failure { message: String },
}

struct WorkerConnection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: JoinHandle<()>,
}

/// Keeps one worker server running for all builds of a pair.
pub struct ConnectionClient {
    executor: Arc<Executor>,
    sink: OutputSink,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    process_args_env: String,
    project_dir: PathBuf,
    connection: Option<WorkerConnection>,
}

impl ConnectionClient {
    pub fn new(
        executor: Arc<Executor>,
        sink: OutputSink,
        build: &BuildConfiguration,
        tool: PathBuf,
        project_dir: PathBuf,
    ) -> Self {
        let command = std::iter::once(tool.display().to_string())
            .chain(build.server_args.iter().cloned())
            .collect();
        Self {
            executor,
            sink,
            command,
            env: build.env.clone(),
            process_args_env: build.process_args_env.clone(),
            project_dir,
            connection: None,
        }
    }

    /// The worker is started lazily, with the process arguments of the first request.
    async fn connect(&mut self, process_args: &[String]) -> anyhow::Result<&mut WorkerConnection> {
        if self.connection.is_none() {
            let connection = self.start_worker(process_args).await?;
            self.connection = Some(connection);
        }
        self.connection
            .as_mut()
            .ok_or_else(|| anyhow!("Worker connection was not established"))
    }

    async fn start_worker(&self, process_args: &[String]) -> anyhow::Result<WorkerConnection> {
        let (program, args) = self
            .command
            .split_first()
            .context("Worker server command is empty")?;
        let display = self.command.join(" ");

        log::info!("Starting build worker server `{display}`");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .current_dir(&self.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !process_args.is_empty() {
            cmd.env(&self.process_args_env, join_process_args(process_args));
        }
        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: display.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to get stdin for the build worker server")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to get stdout for the build worker server")?;
        let stderr = match child.stderr.take() {
            Some(stderr) => drain(stderr, self.sink.clone()),
            None => tokio::spawn(async {}),
        };

        let mut stdout = BufReader::new(stdout).lines();
        timeout(READY_TIMEOUT, async {
            loop {
                match next_message(&mut stdout, &self.sink).await? {
                    WorkerResponse::Ready => return Ok::<(), anyhow::Error>(()),
                    other => log::warn!("Unexpected message before worker was ready: {other:?}"),
                }
            }
        })
        .await
        .context("Timed-out whilst waiting for the build worker server to be ready")??;

        Ok(WorkerConnection {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

/// Reads until the next protocol message, forwarding build output to the sink.
async fn next_message(
    stdout: &mut Lines<BufReader<ChildStdout>>,
    sink: &OutputSink,
) -> anyhow::Result<WorkerResponse> {
    loop {
        let line = stdout
            .next_line()
            .await
            .context("Failed to read from build worker server")?
            .ok_or_else(|| TransportError::Connection {
                reason: "worker server exited".to_string(),
            })?;
        match serde_json::from_str::<WorkerResponse>(&line) {
            Ok(message) => return Ok(message),
            Err(_) => sink.line(&line),
        }
    }
}

impl BuildClient for ConnectionClient {
    fn run(&mut self, request: &BuildRequest) -> anyhow::Result<()> {
        let executor = self.executor.clone();
        let sink = self.sink.clone();
        let message = WorkerRequest {
            tasks: request.tasks.clone(),
            args: request.tool_args.clone(),
            process_args: request.process_args.clone(),
            env: request.env.iter().cloned().collect(),
        };

        executor.execute_in_place(async {
            let connection = self.connect(&request.process_args).await?;

            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            connection
                .stdin
                .write_all(&line)
                .await
                .map_err(|e| TransportError::Connection {
                    reason: e.to_string(),
                })?;
            connection.stdin.flush().await?;

            match next_message(&mut connection.stdout, &sink).await? {
                WorkerResponse::Success => Ok(()),
                WorkerResponse::Failure { message } => Err(anyhow!("Build failed: {message}")),
                WorkerResponse::Ready => Err(TransportError::Connection {
                    reason: "worker server restarted during build".to_string(),
                }
                .into()),
            }
        })
    }

    fn close(&mut self) -> anyhow::Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        self.executor.execute_in_place(async move {
            let WorkerConnection {
                mut child,
                stdin,
                stdout,
                stderr,
            } = connection;
            // Closing stdin asks the server to stop.
            drop(stdin);
            let stdout = tokio::spawn(async move {
                let mut stdout = stdout;
                while let Ok(Some(_)) = stdout.next_line().await {}
            });

            match timeout(DRAIN_TIMEOUT, child.wait()).await {
                Ok(status) => {
                    status.context("Failed to wait for the build worker server")?;
                }
                Err(_) => {
                    log::warn!("Build worker server did not stop, killing it");
                    child.kill().await?;
                }
            }
            join_drains(vec![stdout, stderr]).await;
            Ok(())
        })
    }
}

impl Drop for ConnectionClient {
    fn drop(&mut self) {
        if self.connection.is_some() {
            if let Err(e) = self.close() {
                log::error!("Failed to close connection to build worker server: {e:?}");
            }
        }
    }
}
