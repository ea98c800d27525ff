mod result;
mod scenario;
mod statistics;
mod summary;

pub use result::{BuildInvocationResult, Sample, SampleSource};
pub use scenario::{
    BenchmarkResultCollector, BuildScenarioResult, SampleStatistics, ScenarioDescriptor,
};
pub use statistics::{confidence_percent, percentile, Statistics};
pub use summary::{
    load_summary, store_summary, write_summary_file, BenchmarkSummary, BuildSummary,
    SampleSummary, ScenarioStatus, ScenarioSummary,
};
