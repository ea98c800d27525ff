use anyhow::{bail, Context};
use build_profiler_core::prelude::WorkerId;

use crate::exec::CommandExec;
use crate::profiler::{Profiler, ProfilerController, ProfilerTarget, RecordingOptions};
use crate::types::HookResult;

/// A profiler driven by external commands, e.g. `jcmd {pid} JFR.start`.
///
/// Every argument may use the placeholders `{pid}`, `{output_dir}`, `{scenario}` and `{version}`.
/// Empty commands are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProfilerConfig {
    pub name: String,
    pub can_restart_recording: bool,
    /// Worker process arguments that attach the profiler.
    pub process_args: Vec<String>,
    /// Added when the worker should record from launch.
    pub start_on_launch_args: Vec<String>,
    /// Added when the worker should write the recording when it exits.
    pub capture_on_exit_args: Vec<String>,
    pub start_session: Vec<String>,
    pub start_recording: Vec<String>,
    pub stop_recording: Vec<String>,
    pub stop_session: Vec<String>,
}

impl CommandProfilerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            can_restart_recording: true,
            process_args: Vec::new(),
            start_on_launch_args: Vec::new(),
            capture_on_exit_args: Vec::new(),
            start_session: Vec::new(),
            start_recording: Vec::new(),
            stop_recording: Vec::new(),
            stop_session: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandProfiler {
    config: CommandProfilerConfig,
}

impl CommandProfiler {
    pub fn new(config: CommandProfilerConfig) -> Self {
        Self { config }
    }
}

fn substitute(
    template: &[String],
    target: &ProfilerTarget,
    worker: Option<&WorkerId>,
) -> anyhow::Result<Vec<String>> {
    template
        .iter()
        .map(|arg| {
            let mut arg = arg
                .replace("{output_dir}", &target.output_dir.display().to_string())
                .replace("{scenario}", &target.scenario_name)
                .replace("{version}", &target.version);
            if arg.contains("{pid}") {
                let Some(worker) = worker else {
                    bail!("'{arg}' needs the worker pid, but the build did not report one");
                };
                arg = arg.replace("{pid}", worker.as_str());
            }
            Ok(arg)
        })
        .collect()
}

impl Profiler for CommandProfiler {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn can_restart_recording(&self) -> bool {
        self.config.can_restart_recording
    }

    fn instrumentation_args(&self, target: &ProfilerTarget, options: RecordingOptions) -> Vec<String> {
        let mut template = self.config.process_args.clone();
        if options.start_on_launch {
            template.extend(self.config.start_on_launch_args.iter().cloned());
        }
        if options.capture_on_exit {
            template.extend(self.config.capture_on_exit_args.iter().cloned());
        }
        substitute(&template, target, None).unwrap_or_else(|e| {
            log::warn!("Profiler {} process arguments: {e}", self.config.name);
            Vec::new()
        })
    }

    fn new_controller(&self, target: &ProfilerTarget) -> anyhow::Result<Box<dyn ProfilerController>> {
        std::fs::create_dir_all(&target.output_dir).with_context(|| {
            format!(
                "Could not create profiler output directory '{}'",
                target.output_dir.display()
            )
        })?;
        Ok(Box::new(CommandController {
            config: self.config.clone(),
            worker: target.worker.clone(),
            target: target.clone(),
        }))
    }
}

struct CommandController {
    config: CommandProfilerConfig,
    target: ProfilerTarget,
    worker: Option<WorkerId>,
}

impl CommandController {
    fn run(&self, step: &str, template: &[String]) -> HookResult {
        if template.is_empty() {
            return Ok(());
        }
        let command = substitute(template, &self.target, self.worker.as_ref())?;
        log::info!("Profiler {}: {step}", self.config.name);
        let exec = CommandExec::new(self.target.sink.clone()).in_dir(&self.target.project_dir);
        self.target
            .executor
            .execute_in_place(exec.run(&command))
            .with_context(|| format!("Profiler {} failed to {step}", self.config.name))
    }
}

impl ProfilerController for CommandController {
    fn start_session(&mut self) -> HookResult {
        self.run("start session", &self.config.start_session)
    }

    fn start_recording(&mut self) -> HookResult {
        self.run("start recording", &self.config.start_recording)
    }

    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult {
        if let Some(worker) = worker {
            self.worker = Some(worker.clone());
        }
        self.run("stop recording", &self.config.stop_recording)
    }

    fn stop_session(&mut self) -> HookResult {
        self.run("stop session", &self.config.stop_session)
    }
}
