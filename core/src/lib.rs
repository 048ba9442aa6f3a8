pub mod certificate;
pub mod error;
mod retry;
pub mod service;
pub mod sink;
pub mod slot;
pub mod strategy;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use certificate::Certificate;
pub use error::{AggregateError, PkiError, StorageError};
pub use retry::RetryConfig;
pub use service::{IssueResult, IssueStatus, PkiService};
pub use strategy::{PercentageRenewal, RenewalStrategy, StaticRenewal};
