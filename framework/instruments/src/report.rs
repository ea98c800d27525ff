mod json_report;
mod summary_table;

use std::path::PathBuf;

use build_profiler_summary_model::BenchmarkSummary;

pub use json_report::JsonReportCollector;
pub use summary_table::SummaryTableReportCollector;

pub trait ReportCollector {
    fn name(&self) -> &'static str;

    /// Called once, after every (scenario, version) pair has run.
    fn finalize(&self, summary: &BenchmarkSummary) -> anyhow::Result<()>;
}

/// Chooses which reports are produced at the end of a run.
#[derive(Debug, Default)]
pub struct ReportConfig {
    console_summary: bool,
    json_summary: Option<PathBuf>,
}

impl ReportConfig {
    pub fn enable_console_summary(mut self) -> Self {
        self.console_summary = true;
        self
    }

    /// Write `benchmark.json` into `output_dir`.
    pub fn enable_json_summary(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.json_summary = Some(output_dir.into());
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Box<dyn ReportCollector>> = Vec::new();
        if let Some(dir) = self.json_summary {
            collectors.push(Box::new(JsonReportCollector::new(dir)));
        }
        if self.console_summary {
            collectors.push(Box::new(SummaryTableReportCollector::new()));
        }
        Reporter { collectors }
    }
}

pub struct Reporter {
    collectors: Vec<Box<dyn ReportCollector>>,
}

impl Reporter {
    /// Runs every collector, even when an earlier one fails.
    pub fn finalize(&self, summary: &BenchmarkSummary) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for collector in &self.collectors {
            if let Err(e) = collector.finalize(summary) {
                log::error!("Failed to write {} report: {e:?}", collector.name());
                failed.push(collector.name());
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("Failed to write reports: {}", failed.join(", "));
        }
        Ok(())
    }
}
