use std::path::{Path, PathBuf};

use anyhow::Context;
use build_profiler_summary_model::{write_summary_file, BenchmarkSummary};

use crate::report::ReportCollector;

pub struct JsonReportCollector {
    path: PathBuf,
}

impl JsonReportCollector {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            path: output_dir.join("benchmark.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportCollector for JsonReportCollector {
    fn name(&self) -> &'static str {
        "json"
    }

    fn finalize(&self, summary: &BenchmarkSummary) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_summary_file(summary, &self.path)
            .with_context(|| format!("Could not write {}", self.path.display()))?;
        log::info!("Results written to {}", self.path.display());
        Ok(())
    }
}
