mod directory_size;
mod file_change;
mod scheduled;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use build_profiler_core::prelude::{BuildContext, InvariantViolation, ScenarioContext};

use crate::transport::BuildInvoker;
use crate::types::HookResult;

pub use directory_size::ReportDirectorySizeMutator;
pub use file_change::{ApplyFileChangeMutator, FileChange};
pub use scheduled::{
    ClearDirectory, ClearDirectoryMutator, ExecuteCommand, ExecuteCommandMutator, Schedule,
    ScheduledAction, ScheduledMutator,
};

/// Creates a fresh mutator for every (scenario, version) pair.
pub type MutatorFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn Mutator>> + Send + Sync>;

/// Changes the project between builds. Every hook does nothing unless overridden.
///
/// `after_cleanup` and `after_build` are always called once the guarded step ran, and receive its
/// error when it failed.
pub trait Mutator: Display + Send {
    /// Rejects invokers this mutator cannot work with.
    fn validate(&self, _invoker: BuildInvoker) -> Result<(), InvariantViolation> {
        Ok(())
    }

    fn before_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        Ok(())
    }

    fn before_cleanup(&mut self, _context: &BuildContext) -> HookResult {
        Ok(())
    }

    fn after_cleanup(&mut self, _context: &BuildContext, _error: Option<&anyhow::Error>) -> HookResult {
        Ok(())
    }

    fn before_build(&mut self, _context: &BuildContext) -> HookResult {
        Ok(())
    }

    fn after_build(&mut self, _context: &BuildContext, _error: Option<&anyhow::Error>) -> HookResult {
        Ok(())
    }

    fn after_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoOpMutator;

impl Display for NoOpMutator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("no-op")
    }
}

impl Mutator for NoOpMutator {}

/// Calls every hook on each child in list order, "after" hooks included.
///
/// A failing "before" hook stops the remaining children. A failing "after" hook does not: every
/// child is given the chance to clean up, and the first error is returned.
pub struct CompositeMutator {
    mutators: Vec<Box<dyn Mutator>>,
}

impl CompositeMutator {
    pub fn from_mutators(mut mutators: Vec<Box<dyn Mutator>>) -> Box<dyn Mutator> {
        match mutators.len() {
            0 => Box::new(NoOpMutator),
            1 => mutators.remove(0),
            _ => Box::new(CompositeMutator { mutators }),
        }
    }

    fn each_after(
        &mut self,
        hook: &'static str,
        mut call: impl FnMut(&mut dyn Mutator) -> HookResult,
    ) -> HookResult {
        let mut first = None;
        for mutator in &mut self.mutators {
            if let Err(e) = call(mutator.as_mut()) {
                log::error!("Mutator {mutator} failed in {hook}: {e:?}");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Display for CompositeMutator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = self
            .mutators
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        write!(f, "[{}]", names.join(", "))
    }
}

impl Mutator for CompositeMutator {
    fn validate(&self, invoker: BuildInvoker) -> Result<(), InvariantViolation> {
        self.mutators.iter().try_for_each(|m| m.validate(invoker))
    }

    fn before_scenario(&mut self, context: &ScenarioContext) -> HookResult {
        self.mutators
            .iter_mut()
            .try_for_each(|m| m.before_scenario(context))
    }

    fn before_cleanup(&mut self, context: &BuildContext) -> HookResult {
        self.mutators
            .iter_mut()
            .try_for_each(|m| m.before_cleanup(context))
    }

    fn after_cleanup(&mut self, context: &BuildContext, error: Option<&anyhow::Error>) -> HookResult {
        self.each_after("after_cleanup", |m| m.after_cleanup(context, error))
    }

    fn before_build(&mut self, context: &BuildContext) -> HookResult {
        self.mutators
            .iter_mut()
            .try_for_each(|m| m.before_build(context))
    }

    fn after_build(&mut self, context: &BuildContext, error: Option<&anyhow::Error>) -> HookResult {
        self.each_after("after_build", |m| m.after_build(context, error))
    }

    fn after_scenario(&mut self, context: &ScenarioContext) -> HookResult {
        self.each_after("after_scenario", |m| m.after_scenario(context))
    }
}
