use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use build_profiler_core::prelude::short_hash;
use build_profiler_summary_model::Sample;

use crate::build_config::BuildConfiguration;
use crate::mutator::{CompositeMutator, Mutator, MutatorFactory};
use crate::settings::InvocationSettings;
use crate::transport::BuildInvoker;

/// What to ask the build tool to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BuildAction {
    #[default]
    NoOp,
    RunTasks(Vec<String>),
}

impl BuildAction {
    pub fn run_tasks<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuildAction::RunTasks(tasks.into_iter().map(Into::into).collect())
    }

    pub fn does_something(&self) -> bool {
        matches!(self, BuildAction::RunTasks(_))
    }

    pub fn tasks(&self) -> &[String] {
        match self {
            BuildAction::NoOp => &[],
            BuildAction::RunTasks(tasks) => tasks,
        }
    }
}

impl Display for BuildAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildAction::NoOp => f.write_str("do nothing"),
            BuildAction::RunTasks(tasks) if tasks.is_empty() => f.write_str("run default tasks"),
            BuildAction::RunTasks(tasks) => write!(f, "run tasks {}", tasks.join(", ")),
        }
    }
}

/// The builder for a scenario definition.
pub struct ScenarioDefinitionBuilder {
    name: String,
    title: Option<String>,
    action: BuildAction,
    cleanup: BuildAction,
    mutators: Vec<MutatorFactory>,
    warm_up_count: Option<usize>,
    build_count: Option<usize>,
    tool_args: Vec<String>,
    process_args: Vec<String>,
    system_properties: BTreeMap<String, String>,
    builds: Vec<BuildConfiguration>,
    invoker: BuildInvoker,
    measured_timings: Vec<String>,
}

/// A fully resolved scenario. Immutable once built.
#[derive(Clone)]
pub struct ScenarioDefinition {
    pub name: String,
    pub title: Option<String>,
    pub action: BuildAction,
    pub cleanup: BuildAction,
    pub mutators: Vec<MutatorFactory>,
    pub warm_up_count: usize,
    pub build_count: usize,
    pub output_dir: PathBuf,
    pub tool_args: Vec<String>,
    pub process_args: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub builds: Vec<BuildConfiguration>,
    pub invoker: BuildInvoker,
    /// Secondary timings reported by the build that are summarized next to execution time.
    pub measured_timings: Vec<String>,
}

impl ScenarioDefinitionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            action: BuildAction::NoOp,
            cleanup: BuildAction::NoOp,
            mutators: Vec::new(),
            warm_up_count: None,
            build_count: None,
            tool_args: Vec::new(),
            process_args: Vec::new(),
            system_properties: BTreeMap::new(),
            builds: Vec::new(),
            invoker: BuildInvoker::default(),
            measured_timings: Vec::new(),
        }
    }

    pub fn use_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn use_action(mut self, action: BuildAction) -> Self {
        self.action = action;
        self
    }

    /// Run before every build. Omit it for incremental scenarios.
    pub fn use_cleanup(mut self, cleanup: BuildAction) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn use_mutator<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Mutator>> + Send + Sync + 'static,
    {
        self.mutators.push(Arc::new(factory));
        self
    }

    pub fn use_warm_ups(mut self, count: usize) -> Self {
        self.warm_up_count = Some(count);
        self
    }

    pub fn use_iterations(mut self, count: usize) -> Self {
        self.build_count = Some(count);
        self
    }

    pub fn use_tool_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn use_process_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn use_system_property(mut self, key: &str, value: &str) -> Self {
        self.system_properties
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Run the scenario against this build configuration. May be called once per version.
    pub fn use_build(mut self, build: BuildConfiguration) -> Self {
        self.builds.push(build);
        self
    }

    pub fn use_invoker(mut self, invoker: BuildInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn use_measured_timing(mut self, name: &str) -> Self {
        self.measured_timings.push(name.to_string());
        self
    }

    fn resolve_warm_ups(&self, settings: &InvocationSettings) -> usize {
        if settings.dry_run || !self.invoker.reuses_worker() {
            return 1;
        }
        settings
            .warm_up_count
            .or(self.warm_up_count)
            .unwrap_or_else(|| {
                if settings.benchmark {
                    self.invoker.benchmark_warm_ups()
                } else {
                    self.invoker.profile_warm_ups()
                }
            })
    }

    fn resolve_builds(&self, settings: &InvocationSettings) -> usize {
        if settings.dry_run {
            return 1;
        }
        settings
            .build_count
            .or(self.build_count)
            .unwrap_or(if settings.benchmark { 10 } else { 1 })
    }

    /// Resolves the warm-up and build counts and creates the scenario's output directory.
    pub fn build(self, settings: &InvocationSettings) -> anyhow::Result<ScenarioDefinition> {
        let warm_up_count = self.resolve_warm_ups(settings);
        let build_count = self.resolve_builds(settings);
        let output_dir = settings.output_dir.join(sanitize_file_name(&self.name));
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!(
                "Failed to create scenario output directory '{}'",
                output_dir.display()
            )
        })?;

        Ok(ScenarioDefinition {
            name: self.name,
            title: self.title,
            action: self.action,
            cleanup: self.cleanup,
            mutators: self.mutators,
            warm_up_count,
            build_count,
            output_dir,
            tool_args: self.tool_args,
            process_args: self.process_args,
            system_properties: self.system_properties,
            builds: self.builds,
            invoker: self.invoker,
            measured_timings: self.measured_timings,
        })
    }
}

impl ScenarioDefinition {
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn samples(&self) -> Vec<Sample> {
        std::iter::once(Sample::execution_time())
            .chain(self.measured_timings.iter().map(Sample::timing))
            .collect()
    }

    /// A fresh set of mutators for one (scenario, version) pair.
    pub fn create_mutator(&self) -> anyhow::Result<Box<dyn Mutator>> {
        let mutators = self
            .mutators
            .iter()
            .map(|factory| factory())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(CompositeMutator::from_mutators(mutators))
    }

    pub fn output_dir_for(&self, build: &BuildConfiguration) -> PathBuf {
        if self.builds.len() > 1 {
            self.output_dir.join(sanitize_file_name(&build.version))
        } else {
            self.output_dir.clone()
        }
    }
}

impl Debug for ScenarioDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("action", &self.action)
            .field("cleanup", &self.cleanup)
            .field("mutators", &self.mutators.len())
            .field("warm_up_count", &self.warm_up_count)
            .field("build_count", &self.build_count)
            .field("output_dir", &self.output_dir)
            .field("invoker", &self.invoker)
            .field("builds", &self.builds)
            .finish_non_exhaustive()
    }
}

/// Makes `name` safe to use as a directory name. A name that had to change gets a digest of the
/// original appended, so that names which sanitize to the same text do not share a directory.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized == name && !matches!(name, "" | "." | "..") {
        sanitized
    } else {
        format!("{sanitized}_{}", short_hash(name))
    }
}
