use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

/// Environment variable used to hand process arguments to the build worker when a configuration
/// does not name one.
pub const DEFAULT_PROCESS_ARGS_ENV: &str = "BUILD_PROFILER_OPTS";

/// One version of the build tool that scenarios are run against.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfiguration {
    /// Label used in logs and reports, e.g. `8.5`.
    pub version: String,
    /// The build tool executable. A bare name is looked up on the `PATH`.
    pub tool: PathBuf,
    /// Arguments for the worker process that runs the build, e.g. heap size.
    pub process_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Environment variable through which process arguments are handed to the worker.
    pub process_args_env: String,
    /// Added to every invocation that should use, or start, a reusable worker.
    pub reuse_worker_args: Vec<String>,
    /// Added to every invocation that must not leave a worker behind.
    pub no_worker_args: Vec<String>,
    /// Stops all workers of this version. Empty when the tool has no persistent workers.
    pub stop_workers_args: Vec<String>,
    /// Starts a worker server that accepts build requests over stdin.
    pub server_args: Vec<String>,
    /// Makes the tool go through the motions without doing any work.
    pub dry_run_args: Vec<String>,
}

impl BuildConfiguration {
    pub fn new(version: impl Into<String>, tool: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            tool: tool.into(),
            process_args: Vec::new(),
            env: BTreeMap::new(),
            process_args_env: DEFAULT_PROCESS_ARGS_ENV.to_string(),
            reuse_worker_args: Vec::new(),
            no_worker_args: Vec::new(),
            stop_workers_args: Vec::new(),
            server_args: Vec::new(),
            dry_run_args: Vec::new(),
        }
    }

    /// Resolves the tool to an existing executable.
    pub fn resolve_tool(&self) -> anyhow::Result<PathBuf> {
        resolve_executable(&self.tool)
    }
}

pub(crate) fn resolve_executable(tool: &Path) -> anyhow::Result<PathBuf> {
    if tool.as_os_str().is_empty() {
        bail!("Build tool path is empty");
    }
    if tool.components().count() == 1 && !tool.exists() {
        log::debug!("'{}' is not a path so looking in user's 'PATH'", tool.display());
        return which::which(tool).with_context(|| {
            format!(
                "Build tool '{}' not found in PATH. Install it or configure the full path.",
                tool.display()
            )
        });
    }
    if !tool.exists() {
        bail!("Build tool '{}' doesn't exist", tool.display());
    }
    Ok(tool.to_path_buf())
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt as _;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    #[test]
    fn empty_tool_is_rejected() {
        assert!(BuildConfiguration::new("1", "").resolve_tool().is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        let config = BuildConfiguration::new("1", "/non/existent/path/to/build-tool");
        assert!(config.resolve_tool().is_err());
    }

    #[test]
    fn existing_path_is_used_as_is() {
        let temp = NamedTempFile::new().unwrap();
        let config = BuildConfiguration::new("1", temp.path());
        assert_eq!(temp.path(), config.resolve_tool().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_is_found_on_path() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("fake-build-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&tool).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&tool, perms).unwrap();

        let found = which::which_in("fake-build-tool", Some(temp.path()), temp.path()).unwrap();
        assert_eq!(tool, found);
        assert!(BuildConfiguration::new("1", "surely-not-a-real-build-tool")
            .resolve_tool()
            .is_err());
    }
}
