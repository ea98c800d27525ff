use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::profiler::Profiler;

/// Settings that apply to every scenario of one run.
#[derive(Debug, Clone)]
pub struct InvocationSettings {
    /// The project checkout that every build runs in.
    pub project_dir: PathBuf,
    /// Results, profiler output and per-scenario directories are written here.
    pub output_dir: PathBuf,
    pub profiler: Option<Arc<dyn Profiler>>,
    /// Collect timings. When false, only profiling is done and fewer builds are run by default.
    pub benchmark: bool,
    /// Run each scenario once with a single warm-up, asking the build tool not to do any work.
    pub dry_run: bool,
    /// Overrides the warm-up count of every scenario.
    pub warm_up_count: Option<usize>,
    /// Overrides the measured build count of every scenario.
    pub build_count: Option<usize>,
    /// Added to the system properties of every scenario.
    pub system_properties: BTreeMap<String, String>,
    /// Output of every build tool process is appended to this file.
    pub build_log: Option<PathBuf>,
    pub show_progress: bool,
    /// Print a table of results to the console once all scenarios ran.
    pub console_summary: bool,
}

impl InvocationSettings {
    pub fn new(project_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            output_dir: output_dir.into(),
            profiler: None,
            benchmark: true,
            dry_run: false,
            warm_up_count: None,
            build_count: None,
            system_properties: BTreeMap::new(),
            build_log: None,
            show_progress: true,
            console_summary: true,
        }
    }

    pub fn is_profiling(&self) -> bool {
        self.profiler.is_some()
    }
}
