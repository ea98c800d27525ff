use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use build_profiler_core::prelude::{Phase, WorkerId};
use serde::{Deserialize, Serialize};

use crate::result::millis;
use crate::scenario::{BenchmarkResultCollector, BuildScenarioResult};

/// Summary of a whole run, as written to `benchmark.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkSummary {
    /// Shared by every scenario of the run
    pub invocation_id: String,
    /// Unix timestamp in seconds
    pub started_at: i64,
    /// Unix timestamp in seconds
    pub finished_at: i64,
    /// The version of the profiler that produced this summary
    pub profiler_version: String,
    pub scenarios: Vec<ScenarioSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSummary {
    pub name: String,
    pub title: String,
    pub version: String,
    /// See [crate::ScenarioDescriptor::fingerprint]
    pub fingerprint: String,
    pub warm_up_count: usize,
    pub build_count: usize,
    pub status: ScenarioStatus,
    pub builds: Vec<BuildSummary>,
    pub samples: Vec<SampleSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Succeeded,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSummary {
    pub display_name: String,
    pub phase: Phase,
    pub worker: Option<WorkerId>,
    pub execution_time_ms: f64,
    pub timings_ms: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleSummary {
    pub sample: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub standard_deviation: f64,
    /// Against the first version of the same scenario, when there is one
    pub confidence_percent: Option<f64>,
}

impl BenchmarkSummary {
    pub fn from_collector(
        invocation_id: String,
        started_at: i64,
        finished_at: i64,
        collector: &BenchmarkResultCollector,
    ) -> Self {
        let scenarios = collector
            .results()
            .iter()
            .enumerate()
            .map(|(index, result)| summarize(result, collector.baseline_for(index)))
            .collect();

        Self {
            invocation_id,
            started_at,
            finished_at,
            profiler_version: env!("CARGO_PKG_VERSION").to_string(),
            scenarios,
        }
    }
}

fn summarize(result: &BuildScenarioResult, baseline: Option<&BuildScenarioResult>) -> ScenarioSummary {
    let descriptor = result.descriptor();
    let status = match result.failure() {
        Some(message) => ScenarioStatus::Failed {
            message: message.to_string(),
        },
        None => ScenarioStatus::Succeeded,
    };

    let builds = result
        .results()
        .iter()
        .map(|r| BuildSummary {
            display_name: r.display_name().to_string(),
            phase: r.phase(),
            worker: r.worker_id().cloned(),
            execution_time_ms: millis(r.execution_time()),
            timings_ms: r
                .timings()
                .iter()
                .map(|(k, v)| (k.clone(), millis(*v)))
                .collect(),
        })
        .collect();

    let samples = result
        .statistics()
        .iter()
        .filter_map(|s| {
            let stats = s.statistics.as_ref()?;
            Some(SampleSummary {
                sample: s.sample.name().to_string(),
                count: stats.count,
                min: stats.min,
                max: stats.max,
                mean: stats.mean,
                median: stats.median,
                p90: stats.p90,
                standard_deviation: stats.standard_deviation,
                confidence_percent: baseline.and_then(|b| result.confidence_against(b, &s.sample)),
            })
        })
        .collect();

    ScenarioSummary {
        name: descriptor.name.clone(),
        title: descriptor.title.clone(),
        version: descriptor.version.clone(),
        fingerprint: descriptor.fingerprint(),
        warm_up_count: descriptor.warm_up_count,
        build_count: descriptor.build_count,
        status,
        builds,
        samples,
    }
}

/// Serialize the summary to a writer
pub fn store_summary<W: Write>(summary: &BenchmarkSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

/// Load a summary from a reader
pub fn load_summary<R: Read>(reader: R) -> anyhow::Result<BenchmarkSummary> {
    let reader = std::io::BufReader::new(reader);
    let summary: BenchmarkSummary = serde_json::from_reader(reader)?;
    Ok(summary)
}

/// Write the summary to `path`, replacing any previous file
pub fn write_summary_file(summary: &BenchmarkSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)?;
    store_summary(summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Sample;
    use crate::scenario::tests::{descriptor, result};
    use pretty_assertions::assert_eq;

    fn collector() -> BenchmarkResultCollector {
        let mut collector = BenchmarkResultCollector::new();
        for (version, base) in [("1", 100), ("2", 500)] {
            let mut scenario =
                BuildScenarioResult::new(descriptor("a", version, 1), vec![Sample::execution_time()]);
            scenario.accept(result(Phase::WarmUp, 1, 1000));
            for i in 1..=3 {
                scenario.accept(result(Phase::Measure, i, base + i as u64));
            }
            collector.push(scenario);
        }
        collector.push(BuildScenarioResult::failed(
            descriptor("b", "1", 1),
            vec![Sample::execution_time()],
            "Build failed".to_string(),
        ));
        collector
    }

    #[test]
    fn summarizes_every_pair() {
        let summary = BenchmarkSummary::from_collector("id".to_string(), 1, 2, &collector());

        assert_eq!(3, summary.scenarios.len());
        let first = &summary.scenarios[0];
        assert_eq!(ScenarioStatus::Succeeded, first.status);
        assert_eq!(4, first.builds.len());
        assert_eq!(3, first.samples[0].count);
        assert_eq!(102.0, first.samples[0].median);
        assert_eq!(None, first.samples[0].confidence_percent);

        assert!(summary.scenarios[1].samples[0].confidence_percent.is_some());

        let failed = &summary.scenarios[2];
        assert_eq!(
            ScenarioStatus::Failed {
                message: "Build failed".to_string()
            },
            failed.status
        );
        assert!(failed.builds.is_empty());
        assert!(failed.samples.is_empty());
    }

    #[test]
    fn summary_file_can_be_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchmark.json");
        let summary = BenchmarkSummary::from_collector("id".to_string(), 1, 2, &collector());

        write_summary_file(&summary, &path).unwrap();
        let loaded = load_summary(std::fs::File::open(&path).unwrap()).unwrap();

        assert_eq!(summary, loaded);
    }
}
