mod context;
mod error;
mod interrupt;

pub mod prelude {
    pub use crate::context::{
        short_hash, BuildContext, BuildStep, InvocationId, Phase, ScenarioContext, WorkerId,
    };
    pub use crate::error::{
        InvariantViolation, PairFailure, ScenarioFailures, TransportError, ValidationError,
    };
    pub use crate::interrupt::{InterruptHandle, InterruptListener, RunInterrupted};
}
