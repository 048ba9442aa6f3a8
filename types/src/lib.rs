use async_trait::async_trait;

pub mod bundle;
pub mod error;
pub mod request;

pub use bundle::{CertData, Signature};
pub use error::CaError;
pub use request::{IssueArgs, SignatureArgs};

/// Remote certificate authority. Implementations tag every failure as
/// [`CaError::Permanent`] or [`CaError::Retryable`]; callers only look at
/// that tag.
#[async_trait]
pub trait CaClient: Send + Sync {
    async fn issue(&self, args: &IssueArgs) -> Result<CertData, CaError>;
    async fn sign(&self, csr: &[u8], args: &SignatureArgs) -> Result<Signature, CaError>;
    async fn revoke(&self, serial: &str) -> Result<(), CaError>;
    async fn tidy(&self) -> Result<(), CaError>;
    /// Certificate bundle issued out of band (ACME side process) for `common_name`.
    async fn read_acme(&self, common_name: &str) -> Result<CertData, CaError>;
    async fn fetch_ca_chain(&self) -> Result<Vec<u8>, CaError>;
    async fn fetch_ca(&self, binary: bool) -> Result<Vec<u8>, CaError>;
    async fn fetch_crl(&self, binary: bool) -> Result<Vec<u8>, CaError>;
}
