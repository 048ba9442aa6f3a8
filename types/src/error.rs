use std::error::Error as StdError;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure reported by a [`crate::CaClient`], tagged with whether another
/// attempt could change the outcome.
#[derive(Error, Debug)]
pub enum CaError {
    #[error("Permanent CA Error: {0}")]
    Permanent(#[source] BoxError),
    #[error("Retryable CA Error: {0}")]
    Retryable(#[source] BoxError),
}

impl CaError {
    pub fn permanent(err: impl Into<BoxError>) -> Self {
        Self::Permanent(err.into())
    }

    pub fn retryable(err: impl Into<BoxError>) -> Self {
        Self::Retryable(err.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}
