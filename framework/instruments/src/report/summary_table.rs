use build_profiler_summary_model::{BenchmarkSummary, ScenarioStatus};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::report::ReportCollector;

#[derive(Tabled)]
struct SampleRow {
    scenario: String,
    version: String,
    sample: String,
    #[tabled(display = "float2")]
    mean_ms: f64,
    #[tabled(display = "float2")]
    median_ms: f64,
    #[tabled(display = "float2")]
    min_ms: f64,
    #[tabled(display = "float2")]
    max_ms: f64,
    #[tabled(display = "float2")]
    std_dev_ms: f64,
    #[tabled(display = "confidence")]
    confidence: Option<f64>,
}

fn float2(n: &f64) -> String {
    format!("{n:.2}")
}

fn confidence(c: &Option<f64>) -> String {
    c.map(|c| format!("{c:.1}%")).unwrap_or_default()
}

/// Prints a table of measured statistics per pair, followed by the pairs that failed.
#[derive(Debug, Default)]
pub struct SummaryTableReportCollector;

impl SummaryTableReportCollector {
    pub fn new() -> Self {
        Self
    }

    fn render(summary: &BenchmarkSummary) -> String {
        let rows = summary
            .scenarios
            .iter()
            .flat_map(|scenario| {
                scenario.samples.iter().map(|s| SampleRow {
                    scenario: scenario.title.clone(),
                    version: scenario.version.clone(),
                    sample: s.sample.clone(),
                    mean_ms: s.mean,
                    median_ms: s.median,
                    min_ms: s.min,
                    max_ms: s.max,
                    std_dev_ms: s.standard_deviation,
                    confidence: s.confidence_percent,
                })
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());

        let mut out = format!("\nSummary of measured builds\n{table}\n");
        for scenario in &summary.scenarios {
            if let ScenarioStatus::Failed { message } = &scenario.status {
                out.push_str(&format!(
                    "FAILED: {} using {}: {message}\n",
                    scenario.title, scenario.version
                ));
            }
        }
        out
    }
}

impl ReportCollector for SummaryTableReportCollector {
    fn name(&self) -> &'static str {
        "console summary"
    }

    fn finalize(&self, summary: &BenchmarkSummary) -> anyhow::Result<()> {
        println!("{}", Self::render(summary));
        Ok(())
    }
}
