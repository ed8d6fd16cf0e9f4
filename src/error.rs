//! Failure modes of a localization run.
//!
//! None of these escape [`crate::localizer::FaultLocalizer`]; they are kept on
//! the localizer so the repair engine can tell why localization is unavailable.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalizationError {
    /// The launch could not even be attempted (missing agent, bad config).
    #[error("cannot launch test runtime: {0}")]
    Launch(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read test runtime output: {0}")]
    Stream(#[source] std::io::Error),

    #[error("test runtime did not finish within {0:?}")]
    Timeout(Duration),

    #[error("test runtime exited ({status}) without depositing results")]
    NoResponse { status: String },

    #[error("test runtime reported a failure: {0}")]
    ChildReported(String),

    #[error("rendezvous channel error: {0}")]
    Ipc(#[source] std::io::Error),
}

/// A failed execution together with whatever the child printed before it
/// went wrong.
#[derive(Debug)]
pub struct LocalizationFailure {
    pub error: LocalizationError,
    pub captured_output: Option<String>,
}

impl LocalizationFailure {
    pub fn with_output(error: LocalizationError, captured_output: String) -> Self {
        Self {
            error,
            captured_output: (!captured_output.is_empty()).then_some(captured_output),
        }
    }
}

impl From<LocalizationError> for LocalizationFailure {
    fn from(error: LocalizationError) -> Self {
        Self {
            error,
            captured_output: None,
        }
    }
}

impl std::fmt::Display for LocalizationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for LocalizationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
