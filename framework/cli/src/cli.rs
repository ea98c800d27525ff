use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct BuildProfilerCli {
    /// The scenarios to run, as named in the scenario file. Runs every scenario when omitted.
    pub scenarios: Vec<String>,

    /// TOML file that defines builds, profilers and scenarios
    #[clap(long)]
    pub scenario_file: PathBuf,

    /// The project to build
    #[clap(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Results and profiler output are written here
    #[clap(long, default_value = "profile-out")]
    pub output_dir: PathBuf,

    /// Collect timings of the measured builds
    #[clap(long, default_value = "false")]
    pub benchmark: bool,

    /// Profile the measured builds with this profiler from the scenario file. Can be given more
    /// than once to run several profilers together.
    #[clap(long = "profile")]
    pub profilers: Vec<String>,

    /// Number of warm-up builds, overriding the scenario file
    #[clap(long)]
    pub warmups: Option<usize>,

    /// Number of measured builds, overriding the scenario file
    #[clap(long)]
    pub iterations: Option<usize>,

    /// Run every scenario once, asking the build tool not to do any work
    #[clap(long, default_value = "false")]
    pub dry_run: bool,

    /// Set a system property for every build, in the format `key=value`. Wins over the same
    /// property set by a scenario.
    #[clap(short = 'D', value_parser = parse_system_property)]
    pub system_properties: Vec<(String, String)>,

    /// Append the output of every build tool process to this file
    #[clap(long)]
    pub build_log: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

impl BuildProfilerCli {
    /// Fails when there is nothing to do.
    pub fn check_mode(&self) -> anyhow::Result<()> {
        if !self.benchmark && self.profilers.is_empty() {
            bail!("Neither --profile nor --benchmark specified");
        }
        Ok(())
    }

    pub fn system_property_map(&self) -> BTreeMap<String, String> {
        self.system_properties.iter().cloned().collect()
    }
}

fn parse_system_property(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s.split_once('=').unwrap_or((s, ""));
    if key.is_empty() {
        bail!("No name specified for system property '{s}'");
    }
    Ok((key.to_string(), value.to_string()))
}
