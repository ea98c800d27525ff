use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use build_profiler_core::prelude::BuildContext;
use walkdir::WalkDir;

use crate::mutator::Mutator;
use crate::types::HookResult;

/// Logs the size of a directory after every build, e.g. to watch a build cache grow.
pub struct ReportDirectorySizeMutator {
    path: PathBuf,
}

impl ReportDirectorySizeMutator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Display for ReportDirectorySizeMutator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "report size of '{}'", self.path.display())
    }
}

pub(crate) fn directory_size(path: &Path) -> (u64, usize) {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .fold((0, 0), |(bytes, files), m| (bytes + m.len(), files + 1))
}

impl Mutator for ReportDirectorySizeMutator {
    fn after_build(&mut self, context: &BuildContext, _error: Option<&anyhow::Error>) -> HookResult {
        if !self.path.exists() {
            log::info!("{}: {} does not exist", context.display_name(), self.path.display());
            return Ok(());
        }
        let (bytes, files) = directory_size(&self.path);
        log::info!(
            "{}: {} contains {files} files, {:.2} MiB",
            context.display_name(),
            self.path.display(),
            bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/one"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("a/b/two"), [0u8; 5]).unwrap();

        assert_eq!((15, 2), directory_size(dir.path()));
    }
}
