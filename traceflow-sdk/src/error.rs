//! SDK-level error type shared by providers and processors.

use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for SDK operations that only report failure.
pub type SdkResult = Result<(), SdkError>;

/// Errors returned by provider and processor operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SdkError {
    /// The component has already been shut down.
    #[error("already shutdown")]
    AlreadyShutdown,

    /// The operation did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure, with a human-readable description.
    #[error("{0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for SdkError {
    fn from(err: PoisonError<T>) -> Self {
        SdkError::InternalFailure(format!("lock poisoned: {}", err))
    }
}

/// Collapses the failures of a fan-out operation into one result.
pub(crate) fn aggregate_errors(errors: impl IntoIterator<Item = SdkError>) -> SdkResult {
    let mut errors: Vec<SdkError> = errors.into_iter().collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(SdkError::InternalFailure(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )),
    }
}
