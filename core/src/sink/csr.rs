use async_trait::async_trait;
use pkiwarden_types::Signature;
use tracing::trace;

use super::{write_cert_and_ca, SignatureSink, Slot};
use crate::error::StorageError;

/// Reads a CSR from one slot and stores the signed certificate (and CA chain)
/// the same way a [`super::KeyPairSink`] with a certificate slot does.
pub struct CsrSink {
    csr: Slot,
    cert: Slot,
    ca: Option<Slot>,
}

impl CsrSink {
    pub fn new(csr: Slot, cert: Slot, ca: Option<Slot>) -> Self {
        Self { csr, cert, ca }
    }

    pub async fn can_read(&self) -> Result<(), StorageError> {
        self.csr.can_read().await
    }

    pub async fn can_write(&self) -> Result<(), StorageError> {
        self.cert.can_write().await?;
        if let Some(ca) = &self.ca {
            ca.can_write().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SignatureSink for CsrSink {
    async fn read_csr(&self) -> Result<Vec<u8>, StorageError> {
        trace!("reading csr from {}", self.csr.describe());
        self.csr.read().await
    }

    async fn write_signature(&self, signature: &Signature) -> Result<(), StorageError> {
        trace!("writing signed certificate to {}", self.cert.describe());
        write_cert_and_ca(
            &*self.cert,
            self.ca.as_deref(),
            &signature.certificate,
            signature.ca_data.as_deref(),
        )
        .await
    }
}
