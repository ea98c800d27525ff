//! Runs external commands, forwarding their output to the log and the build log file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use build_profiler_core::prelude::TransportError;
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to wait for output to be drained once a process has exited.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const BUILD_OUTPUT_TARGET: &str = "build_output";

/// Destination for the output of child processes.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    log_file: Option<Arc<Mutex<File>>>,
}

impl OutputSink {
    pub fn new(build_log: Option<&Path>) -> anyhow::Result<Self> {
        let log_file = match build_log {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = File::create(path).with_context(|| {
                    format!("Failed to create build log '{}'", path.display())
                })?;
                Some(Arc::new(Mutex::new(file)))
            }
            None => None,
        };
        Ok(Self { log_file })
    }

    pub fn line(&self, line: &str) {
        log::debug!(target: BUILD_OUTPUT_TARGET, "{line}");
        if let Some(file) = &self.log_file {
            if let Err(e) = writeln!(file.lock(), "{line}") {
                log::warn!("Failed to write to build log: {e}");
            }
        }
    }
}

/// Describes how to launch a command. Cheap to clone and reuse.
#[derive(Debug, Clone)]
pub struct CommandExec {
    dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    input: Option<Vec<u8>>,
    sink: OutputSink,
}

impl CommandExec {
    pub fn new(sink: OutputSink) -> Self {
        Self {
            dir: None,
            env: Vec::new(),
            input: None,
            sink,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Written to the process' stdin, which is then closed. Without input, stdin is closed at once.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Runs the command and fails unless it exits successfully.
    pub async fn run(&self, command: &[String]) -> anyhow::Result<()> {
        self.start(command)?.wait_for_success().await
    }

    /// Starts the command without waiting for it. Must be called from within the runtime.
    pub fn start(&self, command: &[String]) -> Result<RunHandle, TransportError> {
        let display = command.iter().join(" ");
        let (program, args) = command.split_first().ok_or_else(|| TransportError::Spawn {
            command: display.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        log::debug!("Running command `{display}`");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if self.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: display.clone(),
            source,
        })?;

        let mut drains = Vec::with_capacity(3);
        if let Some(stdout) = child.stdout.take() {
            drains.push(drain(stdout, self.sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(drain(stderr, self.sink.clone()));
        }
        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), self.input.clone()) {
            drains.push(tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    log::warn!("Failed to write command input: {e}");
                }
            }));
        }

        Ok(RunHandle {
            command: display,
            child,
            drains,
        })
    }
}

pub(crate) fn drain<R>(reader: R, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    sink.line(line.trim_end_matches(['\r', '\n']));
                }
                Err(e) => {
                    log::warn!("Failed to read command output: {e}");
                    break;
                }
            }
        }
    })
}

/// Joins output helpers, abandoning any that do not finish within [DRAIN_TIMEOUT].
pub(crate) async fn join_drains(drains: Vec<JoinHandle<()>>) {
    for mut handle in drains {
        if timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
            log::warn!("Timed out waiting for command output to be drained");
            handle.abort();
        }
    }
}

/// A running command.
#[derive(Debug)]
pub struct RunHandle {
    command: String,
    child: Child,
    drains: Vec<JoinHandle<()>>,
}

impl RunHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn wait_for_success(mut self) -> anyhow::Result<()> {
        let status = self.child.wait().await;
        join_drains(std::mem::take(&mut self.drains)).await;

        let status = status.with_context(|| format!("Failed to wait for `{}`", self.command))?;
        if !status.success() {
            return Err(TransportError::NonZeroExit {
                command: self.command,
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn kill(mut self) -> anyhow::Result<()> {
        let killed = self.child.kill().await;
        join_drains(std::mem::take(&mut self.drains)).await;
        killed.with_context(|| format!("Failed to kill `{}`", self.command))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn output_is_written_to_build_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("build.log");
        let sink = OutputSink::new(Some(&log)).unwrap();

        runtime()
            .block_on(CommandExec::new(sink).run(&sh("echo out; echo err 1>&2")))
            .unwrap();

        let written = std::fs::read_to_string(&log).unwrap();
        assert!(written.contains("out\n"));
        assert!(written.contains("err\n"));
    }

    #[test]
    fn non_zero_exit_is_a_transport_error() {
        let err = runtime()
            .block_on(CommandExec::new(OutputSink::default()).run(&sh("exit 3")))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::NonZeroExit { .. })
        ));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = runtime()
            .block_on(
                CommandExec::new(OutputSink::default())
                    .run(&["/does/not/exist/build-tool".to_string()]),
            )
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::Spawn { .. })
        ));
    }

    #[test]
    fn input_env_and_dir_are_passed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = CommandExec::new(OutputSink::default())
            .in_dir(dir.path())
            .env("GREETING", "hello")
            .input("from stdin\n");

        runtime()
            .block_on(exec.run(&sh("read line; echo \"$GREETING $line\" > result.txt")))
            .unwrap();

        assert_eq!(
            "hello from stdin\n",
            std::fs::read_to_string(dir.path().join("result.txt")).unwrap()
        );
    }

    #[test]
    fn kill_stops_a_running_command() {
        let rt = runtime();
        rt.block_on(async {
            let handle = CommandExec::new(OutputSink::default())
                .start(&sh("exec sleep 30"))
                .unwrap();
            handle.kill().await.unwrap();
        });
    }
}
