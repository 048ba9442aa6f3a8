use async_trait::async_trait;
use pkiwarden_types::CertData;
use tracing::{debug, warn};

use super::{CertSink, KeyPairSink};
use crate::{
    certificate::Certificate,
    error::{AggregateError, StorageError},
};

/// Fans certificate bundles out to several independently configured
/// [`KeyPairSink`]s.
///
/// Writes are not transactional: a failure or cancellation part way through
/// leaves some destinations updated and others not.
pub struct MultiKeyPairSink {
    sinks: Vec<KeyPairSink>,
}

impl MultiKeyPairSink {
    pub fn new(sinks: Vec<KeyPairSink>) -> Result<Self, StorageError> {
        if sinks.is_empty() {
            return Err(StorageError::NoSinks);
        }
        Ok(Self { sinks })
    }
}

#[async_trait]
impl CertSink for MultiKeyPairSink {
    /// First sink holding a parsable certificate wins. When none does only
    /// the last error is returned; earlier ones are dropped on purpose, unlike
    /// `write_cert` which reports every failure.
    async fn read_cert(&self) -> Result<Certificate, StorageError> {
        let mut last_err = StorageError::NoSinks;
        for sink in &self.sinks {
            match sink.read_cert().await {
                Ok(cert) => return Ok(cert),
                Err(e) => {
                    debug!("unable to read certificate from {}: {}", sink.describe(), e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Every sink is attempted regardless of earlier failures.
    async fn write_cert(&self, data: &CertData) -> Result<(), StorageError> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.write_cert(data).await {
                warn!("unable to write certificate to {}: {}", sink.describe(), e);
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Aggregate(AggregateError(errors)))
        }
    }

    async fn can_read(&self) -> Result<(), StorageError> {
        let mut last_err = StorageError::NoSinks;
        for sink in &self.sinks {
            match sink.can_read().await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn can_write(&self) -> Result<(), StorageError> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.can_write().await {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Aggregate(AggregateError(errors)))
        }
    }
}
