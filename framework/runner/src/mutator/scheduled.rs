use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use build_profiler_core::prelude::{BuildContext, InvariantViolation, ScenarioContext};

use crate::exec::{CommandExec, OutputSink};
use crate::executor::Executor;
use crate::mutator::Mutator;
use crate::transport::BuildInvoker;
use crate::types::HookResult;

/// When a scheduled action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Schedule {
    /// Once, before the first build of the scenario.
    #[display("scenario")]
    Scenario,
    /// Before every cleanup step.
    #[display("cleanup")]
    Cleanup,
    /// Before every build step.
    #[display("build")]
    Build,
}

pub trait ScheduledAction: Display + Send {
    fn execute(&mut self) -> HookResult;
}

/// Runs an action on a [Schedule].
pub struct ScheduledMutator<A> {
    schedule: Schedule,
    action: A,
}

impl<A: ScheduledAction> ScheduledMutator<A> {
    pub fn new(schedule: Schedule, action: A) -> Self {
        Self { schedule, action }
    }

    fn execute_on(&mut self, schedule: Schedule) -> HookResult {
        if self.schedule == schedule {
            self.action.execute()?;
        }
        Ok(())
    }
}

impl<A: ScheduledAction> Display for ScheduledMutator<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} before each {}", self.action, self.schedule)
    }
}

impl<A: ScheduledAction> Mutator for ScheduledMutator<A> {
    fn validate(&self, invoker: BuildInvoker) -> Result<(), InvariantViolation> {
        if self.schedule != Schedule::Scenario && !invoker.allows_mutation_between_builds() {
            return Err(InvariantViolation::UnsupportedMutator {
                mutator: self.to_string(),
                invoker: invoker.to_string(),
            });
        }
        Ok(())
    }

    fn before_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        self.execute_on(Schedule::Scenario)
    }

    fn before_cleanup(&mut self, _context: &BuildContext) -> HookResult {
        self.execute_on(Schedule::Cleanup)
    }

    fn before_build(&mut self, _context: &BuildContext) -> HookResult {
        self.execute_on(Schedule::Build)
    }
}

/// Deletes the contents of a directory, such as a build cache.
pub struct ClearDirectory {
    path: PathBuf,
}

impl ClearDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Display for ClearDirectory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "clear '{}'", self.path.display())
    }
}

impl ScheduledAction for ClearDirectory {
    fn execute(&mut self) -> HookResult {
        log::info!("Clearing {}", self.path.display());
        clear_dir(&self.path)
            .with_context(|| format!("Could not clear '{}'", self.path.display()))
    }
}

fn clear_dir(path: &Path) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

pub type ClearDirectoryMutator = ScheduledMutator<ClearDirectory>;

impl ClearDirectoryMutator {
    pub fn clear(path: impl Into<PathBuf>, schedule: Schedule) -> Self {
        ScheduledMutator::new(schedule, ClearDirectory::new(path))
    }
}

/// Runs a command in the project directory. A failing command is logged and does not fail the
/// build.
pub struct ExecuteCommand {
    executor: Arc<Executor>,
    exec: CommandExec,
    command: Vec<String>,
}

impl ExecuteCommand {
    pub fn new(
        executor: Arc<Executor>,
        sink: OutputSink,
        project_dir: impl Into<PathBuf>,
        command: Vec<String>,
    ) -> Self {
        Self {
            executor,
            exec: CommandExec::new(sink).in_dir(project_dir),
            command,
        }
    }
}

impl Display for ExecuteCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "execute `{}`", self.command.join(" "))
    }
}

impl ScheduledAction for ExecuteCommand {
    fn execute(&mut self) -> HookResult {
        log::info!("Executing command `{}`", self.command.join(" "));
        if let Err(e) = self.executor.execute_in_place(self.exec.run(&self.command)) {
            log::warn!("Command `{}` failed: {e:#}", self.command.join(" "));
        }
        Ok(())
    }
}

pub type ExecuteCommandMutator = ScheduledMutator<ExecuteCommand>;
