use derive_more::{Display, From};
use monitor::{BarrierError, SinkError, VerifyError, VerifyFailure};

use crate::*;

/// Why a scenario did not pass. Everything except `Unsupported` is a
/// failure.
#[derive(Debug, Display, From)]
pub enum ScenarioError {
    #[display(fmt = "unsupported: {}", _0)]
    Unsupported(Unsupported),
    #[display(fmt = "setup failed: {:#}", _0)]
    Setup(anyhow::Error),
    #[display(fmt = "verification failed:\n{}", _0)]
    Verify(VerifyFailure),
    #[display(fmt = "{}", _0)]
    Barrier(BarrierError),
    #[display(fmt = "{}", _0)]
    Sink(SinkError),
}

impl ScenarioError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        ScenarioError::Unsupported(Unsupported::because(reason))
    }

    /// True for the skip signal.
    pub fn is_skip(&self) -> bool {
        matches!(self, ScenarioError::Unsupported(_))
    }

    pub fn as_verify_failure(&self) -> Option<&VerifyFailure> {
        match self {
            ScenarioError::Verify(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<VerifyError> for ScenarioError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Mismatch(failure) => ScenarioError::Verify(failure),
            VerifyError::Barrier(err) => ScenarioError::Barrier(err),
        }
    }
}

impl std::error::Error for ScenarioError {}
