//! The scenario file: build configurations, profilers and scenarios in TOML.
//!
//! ```toml
//! [builds.current]
//! tool = "./gradlew"
//! reuse_worker_args = ["--daemon"]
//! stop_workers_args = ["--stop"]
//!
//! [profilers.jfr]
//! process_args = ["-XX:StartFlightRecording=filename={output_dir}/{scenario}.jfr"]
//!
//! [scenarios.assemble]
//! tasks = ["assemble"]
//! cleanup_tasks = ["clean"]
//! invoker = "cli-no-worker"
//!
//! [[scenarios.assemble.mutators]]
//! kind = "apply-file-change"
//! path = "src/main/java/Main.java"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use build_profiler_runner::prelude::{
    ApplyFileChangeMutator, BuildAction, BuildConfiguration, BuildInvoker, ClearDirectoryMutator,
    CommandProfiler, CommandProfilerConfig, CompositeProfiler, ExecuteCommand,
    ExecuteCommandMutator, FileChange, Mutator, Profiler, ReportDirectorySizeMutator, RunContext,
    Schedule, ScenarioDefinition, ScenarioDefinitionBuilder, DEFAULT_PROCESS_ARGS_ENV,
};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub builds: BTreeMap<String, BuildConfig>,
    #[serde(default)]
    pub profilers: BTreeMap<String, ProfilerConfig>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub tool: PathBuf,
    #[serde(default)]
    pub process_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub process_args_env: Option<String>,
    #[serde(default)]
    pub reuse_worker_args: Vec<String>,
    #[serde(default)]
    pub no_worker_args: Vec<String>,
    #[serde(default)]
    pub stop_workers_args: Vec<String>,
    #[serde(default)]
    pub server_args: Vec<String>,
    #[serde(default)]
    pub dry_run_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilerConfig {
    #[serde(default = "default_true")]
    pub can_restart_recording: bool,
    #[serde(default)]
    pub process_args: Vec<String>,
    #[serde(default)]
    pub start_on_launch_args: Vec<String>,
    #[serde(default)]
    pub capture_on_exit_args: Vec<String>,
    #[serde(default)]
    pub start_session: Vec<String>,
    #[serde(default)]
    pub start_recording: Vec<String>,
    #[serde(default)]
    pub stop_recording: Vec<String>,
    #[serde(default)]
    pub stop_session: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokerConfig {
    #[default]
    Cli,
    Connection,
    CliNoWorker,
    CliColdWorker,
}

impl From<InvokerConfig> for BuildInvoker {
    fn from(value: InvokerConfig) -> Self {
        match value {
            InvokerConfig::Cli => BuildInvoker::Cli,
            InvokerConfig::Connection => BuildInvoker::Connection,
            InvokerConfig::CliNoWorker => BuildInvoker::CliNoWorker,
            InvokerConfig::CliColdWorker => BuildInvoker::CliColdWorker,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleConfig {
    #[default]
    Scenario,
    Cleanup,
    Build,
}

impl From<ScheduleConfig> for Schedule {
    fn from(value: ScheduleConfig) -> Self {
        match value {
            ScheduleConfig::Scenario => Schedule::Scenario,
            ScheduleConfig::Cleanup => Schedule::Cleanup,
            ScheduleConfig::Build => Schedule::Build,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum MutatorConfig {
    /// Appends a comment by default, or replaces `find` with `replace` when given.
    ApplyFileChange {
        path: PathBuf,
        comment_prefix: Option<String>,
        find: Option<String>,
        replace: Option<String>,
    },
    ClearDirectory {
        path: PathBuf,
        #[serde(default)]
        schedule: ScheduleConfig,
    },
    ExecuteCommand {
        command: Vec<String>,
        #[serde(default)]
        schedule: ScheduleConfig,
    },
    ReportDirectorySize {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub title: Option<String>,
    /// Empty runs the tool's default tasks.
    #[serde(default)]
    pub tasks: Vec<String>,
    pub cleanup_tasks: Option<Vec<String>>,
    /// Labels from `[builds]`. Every build when empty.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub invoker: InvokerConfig,
    pub warm_ups: Option<usize>,
    pub iterations: Option<usize>,
    #[serde(default)]
    pub tool_args: Vec<String>,
    #[serde(default)]
    pub process_args: Vec<String>,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub measured_timings: Vec<String>,
    #[serde(default)]
    pub mutators: Vec<MutatorConfig>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file '{}'", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Invalid scenario file '{}'", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// The named profilers, run together when there is more than one.
    pub fn profiler(&self, names: &[String]) -> anyhow::Result<Option<Arc<dyn Profiler>>> {
        let mut profilers = names
            .iter()
            .map(|name| {
                let Some(config) = self.profilers.get(name) else {
                    bail!(
                        "Unknown profiler '{name}'. Available profilers: {}",
                        available(self.profilers.keys())
                    );
                };
                Ok(Arc::new(CommandProfiler::new(config.to_command_config(name))) as Arc<dyn Profiler>)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(match profilers.len() {
            0 => None,
            1 => profilers.pop(),
            _ => Some(Arc::new(CompositeProfiler::new(profilers)) as Arc<dyn Profiler>),
        })
    }

    /// Builds the selected scenarios, or every scenario when none is selected.
    pub fn definitions(
        &self,
        selected: &[String],
        context: &RunContext,
    ) -> anyhow::Result<Vec<ScenarioDefinition>> {
        let names = if selected.is_empty() {
            self.scenarios.keys().cloned().collect()
        } else {
            selected.to_vec()
        };

        names
            .iter()
            .map(|name| {
                let Some(config) = self.scenarios.get(name) else {
                    bail!(
                        "Unknown scenario '{name}'. Available scenarios: {}",
                        available(self.scenarios.keys())
                    );
                };
                self.definition(name, config, context)
                    .with_context(|| format!("Scenario '{name}'"))
            })
            .collect()
    }

    fn definition(
        &self,
        name: &str,
        config: &ScenarioConfig,
        context: &RunContext,
    ) -> anyhow::Result<ScenarioDefinition> {
        let mut builder = ScenarioDefinitionBuilder::new(name)
            .use_action(BuildAction::RunTasks(config.tasks.clone()))
            .use_invoker(config.invoker.into())
            .use_tool_args(config.tool_args.iter().cloned())
            .use_process_args(config.process_args.iter().cloned());
        if let Some(title) = &config.title {
            builder = builder.use_title(title);
        }
        if let Some(cleanup) = &config.cleanup_tasks {
            builder = builder.use_cleanup(BuildAction::RunTasks(cleanup.clone()));
        }
        if let Some(count) = config.warm_ups {
            builder = builder.use_warm_ups(count);
        }
        if let Some(count) = config.iterations {
            builder = builder.use_iterations(count);
        }
        for (key, value) in &config.system_properties {
            builder = builder.use_system_property(key, value);
        }
        for timing in &config.measured_timings {
            builder = builder.use_measured_timing(timing);
        }

        let versions: Vec<&String> = if config.versions.is_empty() {
            self.builds.keys().collect()
        } else {
            config.versions.iter().collect()
        };
        for version in versions {
            let Some(build) = self.builds.get(version) else {
                bail!(
                    "Unknown build '{version}'. Available builds: {}",
                    available(self.builds.keys())
                );
            };
            builder = builder.use_build(build.to_configuration(version));
        }

        for mutator in &config.mutators {
            let mutator = mutator.clone();
            let project_dir = context.settings().project_dir.clone();
            let executor = context.executor().clone();
            let sink = context.sink().clone();
            builder = builder.use_mutator(move || {
                mutator.create(&project_dir, |command, schedule| {
                    ExecuteCommandMutator::new(
                        schedule,
                        ExecuteCommand::new(executor.clone(), sink.clone(), &project_dir, command),
                    )
                })
            });
        }

        builder.build(context.settings())
    }
}

impl BuildConfig {
    fn to_configuration(&self, version: &str) -> BuildConfiguration {
        let mut build = BuildConfiguration::new(version, self.tool.clone());
        build.process_args = self.process_args.clone();
        build.env = self.env.clone();
        build.process_args_env = self
            .process_args_env
            .clone()
            .unwrap_or_else(|| DEFAULT_PROCESS_ARGS_ENV.to_string());
        build.reuse_worker_args = self.reuse_worker_args.clone();
        build.no_worker_args = self.no_worker_args.clone();
        build.stop_workers_args = self.stop_workers_args.clone();
        build.server_args = self.server_args.clone();
        build.dry_run_args = self.dry_run_args.clone();
        build
    }
}

impl ProfilerConfig {
    fn to_command_config(&self, name: &str) -> CommandProfilerConfig {
        let mut config = CommandProfilerConfig::new(name);
        config.can_restart_recording = self.can_restart_recording;
        config.process_args = self.process_args.clone();
        config.start_on_launch_args = self.start_on_launch_args.clone();
        config.capture_on_exit_args = self.capture_on_exit_args.clone();
        config.start_session = self.start_session.clone();
        config.start_recording = self.start_recording.clone();
        config.stop_recording = self.stop_recording.clone();
        config.stop_session = self.stop_session.clone();
        config
    }
}

impl MutatorConfig {
    /// Relative paths are resolved against the project directory.
    fn create(
        &self,
        project_dir: &Path,
        execute: impl Fn(Vec<String>, Schedule) -> ExecuteCommandMutator,
    ) -> anyhow::Result<Box<dyn Mutator>> {
        let mutator: Box<dyn Mutator> = match self {
            MutatorConfig::ApplyFileChange {
                path,
                comment_prefix,
                find,
                replace,
            } => {
                let change = match (find, replace) {
                    (Some(find), Some(replace)) => FileChange::ReplaceText {
                        find: find.clone(),
                        replace: replace.clone(),
                    },
                    (None, None) => FileChange::AppendComment {
                        prefix: comment_prefix.clone().unwrap_or_else(|| "//".to_string()),
                    },
                    _ => bail!("'find' and 'replace' must be given together"),
                };
                Box::new(ApplyFileChangeMutator::new(project_dir.join(path), change)?)
            }
            MutatorConfig::ClearDirectory { path, schedule } => Box::new(
                ClearDirectoryMutator::clear(project_dir.join(path), (*schedule).into()),
            ),
            MutatorConfig::ExecuteCommand { command, schedule } => {
                if command.is_empty() {
                    bail!("'command' must not be empty");
                }
                Box::new(execute(command.clone(), (*schedule).into()))
            }
            MutatorConfig::ReportDirectorySize { path } => {
                Box::new(ReportDirectorySizeMutator::new(project_dir.join(path)))
            }
        };
        Ok(mutator)
    }
}

fn available<'a>(names: impl Iterator<Item = &'a String>) -> String {
    names.map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FILE: &str = r#"
[builds.current]
tool = "./build.sh"
process_args = ["-Xmx1g"]
stop_workers_args = ["--stop"]

[builds.next]
tool = "./next/build.sh"
process_args_env = "TOOL_OPTS"

[profilers.jfr]
can_restart_recording = false
process_args = ["-XX:+FlightRecorder"]
stop_recording = ["jcmd", "{pid}", "JFR.dump"]

[profilers.trace]
process_args = ["-Dtrace=true"]

[scenarios.assemble]
title = "Assemble all"
tasks = ["assemble"]
cleanup_tasks = ["clean"]
versions = ["next"]
invoker = "cli-no-worker"
iterations = 3
system_properties = { "org.example.flag" = "on" }

[[scenarios.assemble.mutators]]
kind = "clear-directory"
path = "build"
schedule = "cleanup"

[[scenarios.assemble.mutators]]
kind = "execute-command"
command = ["git", "status"]

[scenarios.help]
tasks = ["help"]
"#;

    #[test]
    fn parses_every_section() {
        let file = ScenarioFile::parse(FILE).unwrap();

        assert_eq!(2, file.builds.len());
        assert_eq!(Some("TOOL_OPTS".to_string()), file.builds["next"].process_args_env);
        assert!(!file.profilers["jfr"].can_restart_recording);
        assert!(file.profilers["trace"].can_restart_recording);

        let assemble = &file.scenarios["assemble"];
        assert_eq!(InvokerConfig::CliNoWorker, assemble.invoker);
        assert_eq!(Some(vec!["clean".to_string()]), assemble.cleanup_tasks);
        assert_eq!(
            vec![
                MutatorConfig::ClearDirectory {
                    path: PathBuf::from("build"),
                    schedule: ScheduleConfig::Cleanup,
                },
                MutatorConfig::ExecuteCommand {
                    command: vec!["git".to_string(), "status".to_string()],
                    schedule: ScheduleConfig::Scenario,
                },
            ],
            assemble.mutators
        );
        assert_eq!(InvokerConfig::Cli, file.scenarios["help"].invoker);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ScenarioFile::parse("[scenarios.a]\ntask = [\"x\"]\n").unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"), "{err:#}");

        let err = ScenarioFile::parse("[[scenarios.a.mutators]]\nkind = \"shuffle\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("unknown variant"), "{err:#}");
    }

    #[test]
    fn several_profilers_are_combined() {
        let file = ScenarioFile::parse(FILE).unwrap();

        assert!(file.profiler(&[]).unwrap().is_none());
        assert_eq!("jfr", file.profiler(&["jfr".to_string()]).unwrap().unwrap().name());
        let combined = file
            .profiler(&["jfr".to_string(), "trace".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!("jfr+trace", combined.name());
        assert!(!combined.can_restart_recording());

        let err = file.profiler(&["yourkit".to_string()]).unwrap_err();
        assert_eq!(
            "Unknown profiler 'yourkit'. Available profilers: jfr, trace",
            err.to_string()
        );
    }

    #[test]
    fn builds_keep_their_settings() {
        let file = ScenarioFile::parse(FILE).unwrap();

        let current = file.builds["current"].to_configuration("current");
        assert_eq!(PathBuf::from("./build.sh"), current.tool);
        assert_eq!(vec!["-Xmx1g".to_string()], current.process_args);
        assert_eq!(DEFAULT_PROCESS_ARGS_ENV, current.process_args_env);
        assert_eq!(vec!["--stop".to_string()], current.stop_workers_args);
        assert_eq!("TOOL_OPTS", file.builds["next"].to_configuration("next").process_args_env);
    }

    #[test]
    fn file_change_needs_find_and_replace_together() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Main.java"), "class Main {}\n").unwrap();
        let unused = |_: Vec<String>, _: Schedule| -> ExecuteCommandMutator {
            unreachable!("no command configured")
        };

        let append = MutatorConfig::ApplyFileChange {
            path: PathBuf::from("Main.java"),
            comment_prefix: None,
            find: None,
            replace: None,
        };
        assert!(append.create(dir.path(), unused).is_ok());

        let half = MutatorConfig::ApplyFileChange {
            path: PathBuf::from("Main.java"),
            comment_prefix: None,
            find: Some("Main".to_string()),
            replace: None,
        };
        assert!(half.create(dir.path(), unused).is_err());
    }
}
