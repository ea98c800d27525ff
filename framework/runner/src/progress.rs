use indicatif::{ProgressBar, ProgressStyle};

use build_profiler_summary_model::BuildInvocationResult;

/// Shows how many of the planned builds have run.
pub(crate) struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub(crate) fn new(planned_builds: u64, enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(planned_builds);
        match ProgressStyle::with_template(
            "{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} builds {prefix} {msg}",
        ) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => log::debug!("Using default progress style: {e}"),
        }
        Self { bar }
    }

    /// Returns the position to pass to [Progress::end_pair].
    pub(crate) fn begin_pair(&self, scenario: &str, version: &str) -> u64 {
        self.bar.set_prefix(format!("{scenario} using {version}"));
        self.bar.set_message("");
        self.bar.position()
    }

    pub(crate) fn build_finished(&self, result: &BuildInvocationResult) {
        self.bar.inc(1);
        self.bar.set_message(format!(
            "{} {}ms",
            result.display_name(),
            result.execution_time().as_millis()
        ));
    }

    /// Accounts for builds that a failed or skipped pair did not run.
    pub(crate) fn end_pair(&self, start: u64, planned: u64) {
        self.bar.set_position(start + planned);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
