use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Identifies one run of the profiler. Every scenario executed by the same process shares it, so
/// that build ids generated by different scenarios never collide across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(12, &ID_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InvocationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for InvocationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token identifying the process that actually performed a build, typically its OS pid.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The token interpreted as an OS process id, when it is one.
    pub fn as_pid(&self) -> Option<u32> {
        self.0.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    WarmUp,
    Measure,
}

impl Phase {
    pub fn display_build_number(&self, iteration: usize) -> String {
        format!("{} #{iteration}", self.display_name())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::WarmUp => "warm-up build",
            Phase::Measure => "measured build",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::WarmUp => f.write_str("WARM_UP"),
            Phase::Measure => f.write_str("MEASURE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStep {
    Cleanup,
    Build,
}

impl Display for BuildStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStep::Cleanup => f.write_str("CLEANUP"),
            BuildStep::Build => f.write_str("BUILD"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioContext {
    invocation_id: Arc<InvocationId>,
    scenario_name: String,
}

impl ScenarioContext {
    pub fn new(invocation_id: Arc<InvocationId>, scenario_name: impl Into<String>) -> Self {
        Self {
            invocation_id,
            scenario_name: scenario_name.into(),
        }
    }

    pub fn invocation_id(&self) -> &InvocationId {
        &self.invocation_id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// An identifier that is safe to embed in source code and file names.
    ///
    /// The name is sanitized to identifier characters, and a short digest of the raw name is
    /// appended so that two names which sanitize to the same text still produce different ids.
    pub fn unique_scenario_id(&self) -> String {
        format!(
            "_{}_{}_{}",
            self.invocation_id,
            sanitize(&self.scenario_name),
            short_hash(&self.scenario_name)
        )
    }

    pub fn with_build(&self, phase: Phase, iteration: usize) -> BuildContext {
        BuildContext {
            scenario: self.clone(),
            phase,
            iteration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    scenario: ScenarioContext,
    phase: Phase,
    iteration: usize,
}

impl BuildContext {
    pub fn scenario(&self) -> &ScenarioContext {
        &self.scenario
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 1-based within the phase.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn unique_build_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.scenario.unique_scenario_id(),
            self.phase,
            self.iteration
        )
    }

    pub fn display_name(&self) -> String {
        self.phase.display_build_number(self.iteration)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Eight hex characters of the SHA3 digest of `name`.
pub fn short_hash(name: &str) -> String {
    let digest = Sha3_256::digest(name.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}
