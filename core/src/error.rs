use std::fmt;

use pkiwarden_types::CaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not Found")]
    NotFound,
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("PEM Error: {0}")]
    PemError(#[from] pem::PemError),
    #[error("No Certificate Found")]
    NoCertificate,
    #[error("Invalid Certificate: {0}")]
    InvalidCertificate(String),
    #[error("Slot Not Configured: {0}")]
    MissingSlot(&'static str),
    #[error("No Sinks Configured")]
    NoSinks,
    #[error("{0}")]
    Aggregate(AggregateError),
    #[error("Storage Error: {0}")]
    Other(String),
}

impl StorageError {
    /// Nothing has been written to the slot yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Every failure collected while fanning a write out over several sinks.
#[derive(Debug, Default)]
pub struct AggregateError(pub Vec<StorageError>);

impl AggregateError {
    pub fn causes(&self) -> &[StorageError] {
        &self.0
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sink(s) failed: ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("PEM Error: {0}")]
    PemError(#[from] pem::PemError),
    #[error("No Certificate Block Found")]
    NoCertificate,
    #[error("X509 Error: {0}")]
    X509Error(String),
}

impl From<ParseError> for StorageError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NoCertificate => Self::NoCertificate,
            ParseError::PemError(e) => Self::PemError(e),
            ParseError::X509Error(e) => Self::InvalidCertificate(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum PkiError {
    #[error("Issue Failed: {0}")]
    IssueFailed(#[source] CaError),
    #[error("Sign Failed: {0}")]
    SignFailed(#[source] CaError),
    #[error("Revoke Failed: {0}")]
    RevokeFailed(#[source] CaError),
    #[error("Tidy Failed: {0}")]
    TidyFailed(#[source] CaError),
    #[error("Read ACME Failed: {0}")]
    ReadAcmeFailed(#[source] CaError),
    #[error("Fetch Failed: {0}")]
    FetchFailed(#[source] CaError),
    #[error("Read Failed: {0}")]
    ReadFailed(#[source] StorageError),
    #[error("Write Failed: {0}")]
    WriteFailed(#[source] StorageError),
    #[error("Invalid Data: {0}")]
    InvalidData(String),
    #[error("Verification Failed: {0}")]
    VerificationFailed(String),
    #[error("Invalid Certificate")]
    InvalidCertificate,
    #[error("Invalid Threshold: {0}, expected a value between 20 and 80")]
    InvalidThreshold(f64),
    #[error("Empty Serial")]
    EmptySerial,
    #[error("Invalid Request: common name is empty")]
    InvalidArgs,
    #[error("Canceled")]
    Canceled,
}
