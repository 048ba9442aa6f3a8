use async_trait::async_trait;
use pkiwarden_types::CertData;
use tracing::trace;

use super::{append_block, collapse_blank_lines, write_cert_and_ca, CertSink, Slot};
use crate::{certificate::Certificate, error::StorageError};

enum Placement {
    /// Certificate, CA and private key share the key slot.
    Combined { key: Slot },
    /// Certificate and private key share the key slot, CA stored apart.
    SeparateCa { key: Slot, ca: Slot },
    /// Certificate slot (carrying the CA when there is no CA slot) and a
    /// key slot holding only the private key.
    SeparateCert {
        cert: Slot,
        ca: Option<Slot>,
        key: Slot,
    },
}

/// Places certificate, CA chain and private key over up to three slots. The
/// placement is fixed by which slots are configured.
pub struct KeyPairSink {
    placement: Placement,
}

impl KeyPairSink {
    pub fn new(
        cert: Option<Slot>,
        ca: Option<Slot>,
        key: Option<Slot>,
    ) -> Result<Self, StorageError> {
        let key = key.ok_or(StorageError::MissingSlot("key"))?;
        let placement = match (cert, ca) {
            (None, None) => Placement::Combined { key },
            (None, Some(ca)) => Placement::SeparateCa { key, ca },
            (Some(cert), ca) => Placement::SeparateCert { cert, ca, key },
        };
        Ok(Self { placement })
    }

    pub fn describe(&self) -> String {
        match &self.placement {
            Placement::Combined { key } => format!("key={}", key.describe()),
            Placement::SeparateCa { key, ca } => {
                format!("key={} ca={}", key.describe(), ca.describe())
            }
            Placement::SeparateCert { cert, ca, key } => format!(
                "cert={} ca={} key={}",
                cert.describe(),
                ca.as_ref().map(|c| c.describe()).unwrap_or_else(|| "-".into()),
                key.describe()
            ),
        }
    }

    fn slots(&self) -> Vec<&Slot> {
        match &self.placement {
            Placement::Combined { key } => vec![key],
            Placement::SeparateCa { key, ca } => vec![key, ca],
            Placement::SeparateCert { cert, ca, key } => {
                let mut slots = vec![cert, key];
                slots.extend(ca.as_ref());
                slots
            }
        }
    }
}

#[async_trait]
impl CertSink for KeyPairSink {
    async fn read_cert(&self) -> Result<Certificate, StorageError> {
        let data = match &self.placement {
            Placement::SeparateCert { cert, .. } => cert.read().await?,
            Placement::Combined { key } | Placement::SeparateCa { key, .. } => {
                key.read().await?
            }
        };
        Ok(Certificate::from_pem(&data)?)
    }

    async fn write_cert(&self, data: &CertData) -> Result<(), StorageError> {
        let private_key = data.private_key.as_deref().unwrap_or_default();
        match &self.placement {
            Placement::Combined { key } => {
                trace!("writing combined bundle to {}", key.describe());
                let mut buf = Vec::new();
                append_block(&mut buf, &collapse_blank_lines(&data.certificate));
                if let Some(ca_data) = data.ca_data.as_deref() {
                    append_block(&mut buf, &collapse_blank_lines(ca_data));
                }
                append_block(&mut buf, &collapse_blank_lines(private_key));
                key.write(&buf).await
            }
            Placement::SeparateCa { key, ca } => {
                trace!("writing certificate and key to {}", key.describe());
                if let Some(ca_data) = data.ca_data.as_deref().filter(|c| !c.is_empty()) {
                    let mut ca_buf = Vec::new();
                    append_block(&mut ca_buf, &collapse_blank_lines(ca_data));
                    ca.write(&ca_buf).await?;
                }
                let mut buf = Vec::new();
                append_block(&mut buf, &collapse_blank_lines(&data.certificate));
                append_block(&mut buf, &collapse_blank_lines(private_key));
                key.write(&buf).await
            }
            Placement::SeparateCert { cert, ca, key } => {
                trace!("writing certificate to {}", cert.describe());
                write_cert_and_ca(
                    &**cert,
                    ca.as_deref(),
                    &data.certificate,
                    data.ca_data.as_deref(),
                )
                .await?;
                if private_key.is_empty() {
                    return Ok(());
                }
                let mut buf = Vec::new();
                append_block(&mut buf, &collapse_blank_lines(private_key));
                key.write(&buf).await
            }
        }
    }

    async fn can_read(&self) -> Result<(), StorageError> {
        match &self.placement {
            Placement::SeparateCert { cert, .. } => cert.can_read().await,
            Placement::Combined { key } | Placement::SeparateCa { key, .. } => {
                key.can_read().await
            }
        }
    }

    async fn can_write(&self) -> Result<(), StorageError> {
        for slot in self.slots() {
            slot.can_write().await?;
        }
        Ok(())
    }
}
