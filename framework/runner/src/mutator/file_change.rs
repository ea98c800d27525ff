use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use anyhow::{bail, Context};
use build_profiler_core::prelude::{BuildContext, ScenarioContext};

use crate::mutator::Mutator;
use crate::types::HookResult;

/// How the modified variant of a file is derived from its original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Append a comment line, e.g. `// <build id>`, using the given prefix.
    AppendComment { prefix: String },
    /// Replace the first occurrence of `find`. `{id}` in `replace` becomes the unique build id.
    ReplaceText { find: String, replace: String },
}

impl FileChange {
    fn apply(&self, original: &[u8], id: &str) -> anyhow::Result<Vec<u8>> {
        match self {
            FileChange::AppendComment { prefix } => {
                let mut changed = original.to_vec();
                if original.last().is_some_and(|b| *b != b'\n') {
                    changed.push(b'\n');
                }
                changed.extend_from_slice(format!("{prefix} {id}\n").as_bytes());
                Ok(changed)
            }
            FileChange::ReplaceText { find, replace } => {
                let original =
                    std::str::from_utf8(original).context("Replacing text needs a UTF-8 file")?;
                if !original.contains(find.as_str()) {
                    bail!("Text '{find}' not found");
                }
                Ok(original
                    .replacen(find.as_str(), &replace.replace("{id}", id), 1)
                    .into_bytes())
            }
        }
    }
}

/// Alternates a source file between a modified variant and its original content on every build,
/// so that each build sees a change. The original is always restored when the scenario ends.
pub struct ApplyFileChangeMutator {
    path: PathBuf,
    original: Vec<u8>,
    change: FileChange,
    modified: bool,
}

impl ApplyFileChangeMutator {
    /// Reads the original bytes immediately.
    pub fn new(path: impl Into<PathBuf>, change: FileChange) -> anyhow::Result<Self> {
        let path = path.into();
        let original = std::fs::read(&path)
            .with_context(|| format!("Could not read file to change '{}'", path.display()))?;
        Ok(Self {
            path,
            original,
            change,
            modified: false,
        })
    }

    fn write(&self, contents: &[u8]) -> HookResult {
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Could not write '{}'", self.path.display()))
    }
}

impl Display for ApplyFileChangeMutator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "apply change to '{}'", self.path.display())
    }
}

impl Mutator for ApplyFileChangeMutator {
    fn before_build(&mut self, context: &BuildContext) -> HookResult {
        if self.modified {
            self.write(&self.original)?;
        } else {
            let text = self
                .change
                .apply(&self.original, &context.unique_build_id())
                .with_context(|| format!("Could not change '{}'", self.path.display()))?;
            self.write(&text)?;
        }
        self.modified = !self.modified;
        Ok(())
    }

    fn after_scenario(&mut self, _context: &ScenarioContext) -> HookResult {
        self.modified = false;
        self.write(&self.original)
    }
}
