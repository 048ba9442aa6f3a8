use pkiwarden_types::CaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("HTTP Error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Vault Error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("Decode Error: {0}")]
    DecodeError(String),
    #[error("Missing Field: {0}")]
    MissingField(&'static str),
}

impl VaultError {
    /// Client side request errors can not succeed on retry, except rate
    /// limiting. Server side and transport errors may.
    pub fn is_permanent(&self) -> bool {
        match self {
            VaultError::Status { status, .. } => *status != 429 && (400..500).contains(status),
            VaultError::HttpError(e) => e.is_builder() || e.is_decode() || e.is_redirect(),
            VaultError::DecodeError(_) | VaultError::MissingField(_) => true,
        }
    }
}

impl From<VaultError> for CaError {
    fn from(err: VaultError) -> Self {
        if err.is_permanent() {
            CaError::permanent(err)
        } else {
            CaError::retryable(err)
        }
    }
}
