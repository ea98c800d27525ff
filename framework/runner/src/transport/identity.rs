use build_profiler_core::prelude::{InvariantViolation, WorkerId};

use crate::transport::TransportKind;

/// Verifies that builds ran in the workers the transport promises.
///
/// A reused worker must serve every build of the pair. Cold workers must never serve two
/// consecutive builds. Builds that did not report a worker are not checked.
#[derive(Debug)]
pub struct WorkerIdentityCheck {
    kind: TransportKind,
    baseline: Option<WorkerId>,
    previous: Option<WorkerId>,
}

impl WorkerIdentityCheck {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            baseline: None,
            previous: None,
        }
    }

    /// The worker of the first build that reported one.
    pub fn baseline(&self) -> Option<&WorkerId> {
        self.baseline.as_ref()
    }

    pub fn check(&mut self, worker: Option<&WorkerId>) -> Result<(), InvariantViolation> {
        let Some(worker) = worker else {
            log::warn!("Build did not report its worker, skipping worker identity check");
            return Ok(());
        };

        let result = match self.kind {
            TransportKind::ReusedWorker => match &self.baseline {
                Some(expected) if expected != worker => Err(InvariantViolation::MultipleWorkers {
                    expected: expected.clone(),
                    actual: worker.clone(),
                }),
                _ => Ok(()),
            },
            TransportKind::ColdWorkerPerInvocation | TransportKind::ColdThenKill => {
                match &self.previous {
                    Some(previous) if previous == worker => {
                        Err(InvariantViolation::WorkerReused {
                            worker: worker.clone(),
                        })
                    }
                    _ => Ok(()),
                }
            }
        };

        if self.baseline.is_none() {
            self.baseline = Some(worker.clone());
        }
        self.previous = Some(worker.clone());
        result
    }
}
