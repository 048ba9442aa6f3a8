use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::Slot;
use crate::{error::StorageError, slot::StorageSlot};

/// Destination for the raw CA certificate. Without a slot the data goes to
/// stdout.
pub struct CaSink {
    slot: Option<Slot>,
}

impl CaSink {
    pub fn new(slot: Option<Slot>) -> Self {
        Self { slot }
    }

    pub async fn write_ca(&self, data: &[u8]) -> Result<(), StorageError> {
        write_blob(self.slot.as_deref(), data, &mut tokio::io::stdout()).await
    }
}

/// Destination for the raw CRL. Without a slot the data goes to stdout.
pub struct CrlSink {
    slot: Option<Slot>,
}

impl CrlSink {
    pub fn new(slot: Option<Slot>) -> Self {
        Self { slot }
    }

    pub async fn write_crl(&self, data: &[u8]) -> Result<(), StorageError> {
        write_blob(self.slot.as_deref(), data, &mut tokio::io::stdout()).await
    }
}

async fn write_blob<W>(
    slot: Option<&dyn StorageSlot>,
    data: &[u8],
    fallback: &mut W,
) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin + Send,
{
    match slot {
        Some(slot) => {
            trace!("writing {} bytes to {}", data.len(), slot.describe());
            slot.write(data).await
        }
        None => {
            fallback.write_all(data).await?;
            fallback.flush().await?;
            Ok(())
        }
    }
}
