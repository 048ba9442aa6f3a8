use async_trait::async_trait;
use pkiwarden_types::{CertData, Signature};

use crate::{certificate::Certificate, error::StorageError, slot::StorageSlot};

mod blob;
mod csr;
mod keypair;
mod multi;

pub use blob::{CaSink, CrlSink};
pub use csr::CsrSink;
pub use keypair::KeyPairSink;
pub use multi::MultiKeyPairSink;

pub type Slot = Box<dyn StorageSlot>;

/// Certificate bundle aware read/write surface used by issue and ACME reads.
#[async_trait]
pub trait CertSink: Send + Sync {
    async fn read_cert(&self) -> Result<Certificate, StorageError>;
    async fn write_cert(&self, data: &CertData) -> Result<(), StorageError>;
    async fn can_read(&self) -> Result<(), StorageError>;
    async fn can_write(&self) -> Result<(), StorageError>;
}

/// CSR source and signed certificate destination used by the sign flow.
#[async_trait]
pub trait SignatureSink: Send + Sync {
    async fn read_csr(&self) -> Result<Vec<u8>, StorageError>;
    async fn write_signature(&self, signature: &Signature) -> Result<(), StorageError>;
}

/// Appends `block` to `buf` terminated by exactly one newline.
pub(crate) fn append_block(buf: &mut Vec<u8>, block: &[u8]) {
    let end = block
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map(|i| i + 1)
        .unwrap_or(0);
    if end == 0 {
        return;
    }
    buf.extend_from_slice(&block[..end]);
    buf.push(b'\n');
}

/// Collapses runs of line breaks (blank lines) into a single line break.
pub(crate) fn collapse_blank_lines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == b'\r' {
            continue;
        }
        if b == b'\n' && (out.is_empty() || out.last() == Some(&b'\n')) {
            continue;
        }
        out.push(b);
    }
    out
}

/// Certificate into `cert`, CA data next to it unless a dedicated `ca` slot
/// exists.
pub(crate) async fn write_cert_and_ca(
    cert: &dyn StorageSlot,
    ca: Option<&dyn StorageSlot>,
    certificate: &[u8],
    ca_data: Option<&[u8]>,
) -> Result<(), StorageError> {
    let ca_data = ca_data.filter(|c| !c.is_empty());
    let mut buf = Vec::new();
    append_block(&mut buf, certificate);
    match (ca, ca_data) {
        (None, Some(ca_data)) => append_block(&mut buf, ca_data),
        (Some(ca), Some(ca_data)) => {
            let mut ca_buf = Vec::new();
            append_block(&mut ca_buf, ca_data);
            ca.write(&ca_buf).await?;
        }
        (_, None) => {}
    }
    cert.write(&buf).await
}
