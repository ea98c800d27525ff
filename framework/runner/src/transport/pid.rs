use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use build_profiler_core::prelude::WorkerId;
use tempfile::NamedTempFile;

/// Names the file in which the build reports its worker.
pub const PID_FILE_ENV: &str = "BUILD_PROFILER_PID_FILE";

/// What the build wrote to the side channel after an invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerReport {
    pub worker: Option<WorkerId>,
    pub timings: BTreeMap<String, Duration>,
}

/// Side channel through which the build reports the identity of the worker that ran it.
///
/// The first line of the file is the worker token, usually its pid. Any following `name=millis`
/// lines are secondary timings.
#[derive(Debug)]
pub struct PidInstrumentation {
    file: NamedTempFile,
}

impl PidInstrumentation {
    pub fn new() -> anyhow::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("build-profiler-pid")
            .suffix(".txt")
            .tempfile()
            .context("Failed to create worker pid file")?;
        Ok(Self { file })
    }

    pub fn env(&self) -> (String, String) {
        (
            PID_FILE_ENV.to_string(),
            self.file.path().display().to_string(),
        )
    }

    /// Forget the previous report so that a build which does not write one is noticed.
    pub fn clear(&self) -> anyhow::Result<()> {
        std::fs::write(self.file.path(), b"").context("Failed to reset worker pid file")
    }

    pub fn read(&self) -> anyhow::Result<WorkerReport> {
        let contents =
            std::fs::read_to_string(self.file.path()).context("Failed to read worker pid file")?;
        Ok(parse_report(&contents))
    }
}

fn parse_report(contents: &str) -> WorkerReport {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
    let worker = lines.next().map(WorkerId::new);

    let mut timings = BTreeMap::new();
    for line in lines {
        match line.split_once('=').and_then(|(name, millis)| {
            let millis = millis.trim().parse::<f64>().ok()?;
            Some((name.trim(), Duration::try_from_secs_f64(millis / 1000.0).ok()?))
        }) {
            Some((name, duration)) => {
                timings.insert(name.to_string(), duration);
            }
            None => log::warn!("Ignoring malformed timing line '{line}'"),
        }
    }

    WorkerReport { worker, timings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_worker_and_timings() {
        let pid = PidInstrumentation::new().unwrap();
        let (key, path) = pid.env();
        assert_eq!(PID_FILE_ENV, key);
        std::fs::write(path, "4242\nconfiguration=125\nbogus\n").unwrap();

        let report = pid.read().unwrap();

        assert_eq!(Some(WorkerId::new("4242")), report.worker);
        assert_eq!(
            BTreeMap::from([("configuration".to_string(), Duration::from_millis(125))]),
            report.timings
        );
    }

    #[test]
    fn out_of_range_timings_are_ignored() {
        let report = parse_report(
            "4242\nconfiguration=inf\nexecution=1e300\nnegative=-5\nnan=NaN\ntasks=125\n",
        );

        assert_eq!(Some(WorkerId::new("4242")), report.worker);
        assert_eq!(
            BTreeMap::from([("tasks".to_string(), Duration::from_millis(125))]),
            report.timings
        );
    }

    #[test]
    fn cleared_file_reports_no_worker() {
        let pid = PidInstrumentation::new().unwrap();
        std::fs::write(pid.env().1, "1\n").unwrap();

        pid.clear().unwrap();

        assert_eq!(WorkerReport::default(), pid.read().unwrap());
    }
}
