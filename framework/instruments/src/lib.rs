mod report;

use std::time::{Duration, Instant};


/// Times a single operation, such as one build invocation.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    operation_id: String,
    started: Instant,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish<T, E>(self, response: &Result<T, E>) -> Duration {
        let duration = self.started.elapsed();
        log::debug!(
            "Operation {} took {}ms, and failed? {:?}",
            self.operation_id,
            duration.as_millis(),
            response.is_err(),
        );
        duration
    }
}

pub mod prelude {
    pub use crate::report::{
        JsonReportCollector, ReportCollector, ReportConfig, Reporter, SummaryTableReportCollector,
    };
    pub use crate::OperationRecord;
}
