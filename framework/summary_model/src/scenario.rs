use std::cell::OnceCell;
use std::collections::BTreeMap;

use sha3::Digest;

use crate::result::{BuildInvocationResult, Sample};
use crate::statistics::{confidence_percent, Statistics};

/// What was run for one (scenario, version) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDescriptor {
    pub name: String,
    pub title: String,
    pub version: String,
    pub warm_up_count: usize,
    pub build_count: usize,
    pub tasks: Vec<String>,
    pub tool_args: Vec<String>,
    pub process_args: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
}

impl ScenarioDescriptor {
    /// Identifies the configuration a pair was run with, so that results of separate runs can be
    /// compared only when they measured the same thing.
    ///
    /// Computed with [sha3::Sha3_256] over the scenario name, version, counts, tasks, arguments
    /// and system properties.
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.name.as_bytes());
        Digest::update(&mut hasher, self.version.as_bytes());
        Digest::update(&mut hasher, self.warm_up_count.to_le_bytes());
        Digest::update(&mut hasher, self.build_count.to_le_bytes());
        self.tasks
            .iter()
            .chain(self.tool_args.iter())
            .chain(self.process_args.iter())
            .for_each(|v| Digest::update(&mut hasher, v.as_bytes()));
        self.system_properties.iter().for_each(|(k, v)| {
            Digest::update(&mut hasher, k.as_bytes());
            Digest::update(&mut hasher, v.as_bytes());
        });

        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone)]
pub struct SampleStatistics {
    pub sample: Sample,
    pub statistics: Option<Statistics>,
}

/// All results of one (scenario, version) pair, warm-ups included.
#[derive(Debug)]
pub struct BuildScenarioResult {
    descriptor: ScenarioDescriptor,
    samples: Vec<Sample>,
    results: Vec<BuildInvocationResult>,
    failure: Option<String>,
    statistics: OnceCell<Vec<SampleStatistics>>,
}

impl BuildScenarioResult {
    pub fn new(descriptor: ScenarioDescriptor, samples: Vec<Sample>) -> Self {
        Self {
            descriptor,
            samples,
            results: Vec::new(),
            failure: None,
            statistics: OnceCell::new(),
        }
    }

    /// A pair that did not complete. It carries no results.
    pub fn failed(descriptor: ScenarioDescriptor, samples: Vec<Sample>, message: String) -> Self {
        Self {
            failure: Some(message),
            ..Self::new(descriptor, samples)
        }
    }

    pub fn accept(&mut self, result: BuildInvocationResult) {
        self.results.push(result);
        self.statistics.take();
    }

    pub fn descriptor(&self) -> &ScenarioDescriptor {
        &self.descriptor
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn results(&self) -> &[BuildInvocationResult] {
        &self.results
    }

    /// Results after the first `warm_up_count` entries.
    pub fn measured_results(&self) -> &[BuildInvocationResult] {
        self.results
            .get(self.descriptor.warm_up_count..)
            .unwrap_or(&[])
    }

    pub fn measured_values(&self, sample: &Sample) -> Vec<f64> {
        self.measured_results()
            .iter()
            .filter_map(|r| sample.extract(r))
            .collect()
    }

    pub fn statistics(&self) -> &[SampleStatistics] {
        self.statistics.get_or_init(|| {
            self.samples
                .iter()
                .map(|sample| SampleStatistics {
                    sample: sample.clone(),
                    statistics: Statistics::from_values(&self.measured_values(sample)),
                })
                .collect()
        })
    }

    pub fn confidence_against(&self, baseline: &BuildScenarioResult, sample: &Sample) -> Option<f64> {
        confidence_percent(
            &baseline.measured_values(sample),
            &self.measured_values(sample),
        )
    }
}

/// Every pair of a run, in execution order.
#[derive(Debug, Default)]
pub struct BenchmarkResultCollector {
    results: Vec<BuildScenarioResult>,
}

impl BenchmarkResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: BuildScenarioResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[BuildScenarioResult] {
        &self.results
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.failure.is_some()).count()
    }

    /// The first completed pair of the same scenario, when it is not the pair itself.
    pub fn baseline_for(&self, index: usize) -> Option<&BuildScenarioResult> {
        let name = &self.results.get(index)?.descriptor.name;
        self.results[..index]
            .iter()
            .find(|r| &r.descriptor.name == name && r.failure.is_none())
    }
}
