use pkiwarden_types::{CaClient, IssueArgs, SignatureArgs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    certificate::Certificate,
    error::PkiError,
    retry::{retry, RetryConfig},
    sink::{CaSink, CertSink, CrlSink, SignatureSink},
    strategy::RenewalStrategy,
    verify::verify_certificate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueStatus {
    #[default]
    Unknown,
    Noop,
    Issued,
}

#[derive(Debug, Clone, Default)]
pub struct IssueResult {
    pub status: IssueStatus,
    pub existing_cert: Option<Certificate>,
    pub issued_cert: Option<Certificate>,
}

/// Drives the certificate lifecycle: reads what is stored, decides, talks to
/// the CA and persists the outcome. Holds no state between operations.
pub struct PkiService<C> {
    client: C,
    strategy: Box<dyn RenewalStrategy>,
    retry: RetryConfig,
}

impl<C: CaClient> PkiService<C> {
    pub fn new(client: C, strategy: Box<dyn RenewalStrategy>) -> Self {
        Self {
            client,
            strategy,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    #[instrument(name = "pki::issue", skip_all, fields(common_name = %args.common_name))]
    pub async fn issue(
        &self,
        cancel: &CancellationToken,
        sink: &dyn CertSink,
        args: &IssueArgs,
    ) -> Result<IssueResult, PkiError> {
        if !args.is_valid() {
            return Err(PkiError::InvalidArgs);
        }
        let existing = match sink.read_cert().await {
            Ok(cert) => Some(cert),
            Err(e) if e.is_not_found() => {
                debug!("no certificate stored yet");
                None
            }
            Err(e) => {
                warn!("unable to read existing certificate: {}", e);
                None
            }
        };

        if let Some(cert) = &existing {
            if !self.should_issue(cancel, cert).await? {
                info!(
                    "certificate {} is still valid until {}, nothing to do",
                    cert.serial(),
                    format_timestamp(cert.not_after())
                );
                return Ok(IssueResult {
                    status: IssueStatus::Noop,
                    existing_cert: existing,
                    issued_cert: None,
                });
            }
        }

        let data = retry(&self.retry, cancel, "issue", || self.client.issue(args))
            .await
            .map_err(|e| e.into_pki(PkiError::IssueFailed))?;
        let issued = Certificate::from_pem(&data.certificate)
            .map_err(|e| PkiError::InvalidData(format!("issued certificate: {}", e)))?;
        sink.write_cert(&data).await.map_err(PkiError::WriteFailed)?;
        info!(
            "issued certificate {} for {} valid until {}",
            issued.serial(),
            issued.subject(),
            format_timestamp(issued.not_after())
        );

        Ok(IssueResult {
            status: IssueStatus::Issued,
            existing_cert: existing,
            issued_cert: Some(issued),
        })
    }

    async fn should_issue(
        &self,
        cancel: &CancellationToken,
        existing: &Certificate,
    ) -> Result<bool, PkiError> {
        if existing.is_expired() {
            debug!("certificate {} expired, skipping verification", existing.serial());
        } else {
            match self.verify(cancel, existing).await {
                Ok(()) => trace!("existing certificate verified"),
                Err(PkiError::Canceled) => return Err(PkiError::Canceled),
                Err(e) => {
                    warn!("existing certificate can not be verified, renewing: {}", e);
                    return Ok(true);
                }
            }
        }
        self.strategy.renew(Some(existing))
    }

    #[instrument(name = "pki::sign", skip_all, fields(common_name = %args.common_name))]
    pub async fn sign(
        &self,
        cancel: &CancellationToken,
        sink: &dyn SignatureSink,
        args: &SignatureArgs,
    ) -> Result<(), PkiError> {
        if !args.is_valid() {
            return Err(PkiError::InvalidArgs);
        }
        let csr = sink.read_csr().await.map_err(PkiError::ReadFailed)?;
        let signature = retry(&self.retry, cancel, "sign", || self.client.sign(&csr, args))
            .await
            .map_err(|e| e.into_pki(PkiError::SignFailed))?;
        let signed = Certificate::from_pem(&signature.certificate)
            .map_err(|e| PkiError::InvalidData(format!("signed certificate: {}", e)))?;
        sink.write_signature(&signature)
            .await
            .map_err(PkiError::WriteFailed)?;
        info!(
            "signed certificate {} valid until {}",
            signature.serial,
            format_timestamp(signed.not_after())
        );
        Ok(())
    }

    #[instrument(name = "pki::revoke", skip(self, cancel))]
    pub async fn revoke(&self, cancel: &CancellationToken, serial: &str) -> Result<(), PkiError> {
        if serial.trim().is_empty() {
            return Err(PkiError::EmptySerial);
        }
        retry(&self.retry, cancel, "revoke", || self.client.revoke(serial))
            .await
            .map_err(|e| e.into_pki(PkiError::RevokeFailed))?;
        info!("revoked certificate {}", serial);
        Ok(())
    }

    #[instrument(name = "pki::tidy", skip_all)]
    pub async fn tidy(&self, cancel: &CancellationToken) -> Result<(), PkiError> {
        retry(&self.retry, cancel, "tidy", || self.client.tidy())
            .await
            .map_err(|e| e.into_pki(PkiError::TidyFailed))?;
        debug!("tidy triggered");
        Ok(())
    }

    /// Stores the certificate a side process obtained for `common_name`.
    /// Reports `Issued` only when it differs byte for byte from the stored
    /// one; with nothing stored yet the result is `Noop`.
    #[instrument(name = "pki::read_acme", skip(self, cancel, sink))]
    pub async fn read_acme(
        &self,
        cancel: &CancellationToken,
        sink: &dyn CertSink,
        common_name: &str,
    ) -> Result<IssueResult, PkiError> {
        let data = retry(&self.retry, cancel, "read_acme", || {
            self.client.read_acme(common_name)
        })
        .await
        .map_err(|e| e.into_pki(PkiError::ReadAcmeFailed))?;
        let fetched = Certificate::from_pem(&data.certificate)
            .map_err(|e| PkiError::InvalidData(format!("acme certificate: {}", e)))?;

        let existing = match sink.read_cert().await {
            Ok(cert) => Some(cert),
            Err(e) => {
                debug!("no readable local certificate: {}", e);
                None
            }
        };
        sink.write_cert(&data).await.map_err(PkiError::WriteFailed)?;

        // TODO: decide whether first time provisioning should report Issued
        let status = match &existing {
            Some(existing) if existing.der() != fetched.der() => IssueStatus::Issued,
            _ => IssueStatus::Noop,
        };
        debug!("acme certificate {} stored, status {:?}", fetched.serial(), status);
        Ok(IssueResult {
            status,
            existing_cert: existing,
            issued_cert: Some(fetched),
        })
    }

    /// Checks `cert` against the CA's current chain. A failure here is not
    /// fatal for issuance, it only marks the certificate for renewal.
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        cert: &Certificate,
    ) -> Result<(), PkiError> {
        let chain = retry(&self.retry, cancel, "fetch_ca_chain", || {
            self.client.fetch_ca_chain()
        })
        .await
        .map_err(|e| e.into_pki(PkiError::FetchFailed))?;
        verify_certificate(cert, &chain)
    }

    #[instrument(name = "pki::fetch_ca", skip(self, cancel, sink))]
    pub async fn fetch_ca(
        &self,
        cancel: &CancellationToken,
        sink: &CaSink,
        binary: bool,
    ) -> Result<(), PkiError> {
        let data = retry(&self.retry, cancel, "fetch_ca", || {
            self.client.fetch_ca(binary)
        })
        .await
        .map_err(|e| e.into_pki(PkiError::FetchFailed))?;
        sink.write_ca(&data).await.map_err(PkiError::WriteFailed)
    }

    #[instrument(name = "pki::fetch_crl", skip(self, cancel, sink))]
    pub async fn fetch_crl(
        &self,
        cancel: &CancellationToken,
        sink: &CrlSink,
        binary: bool,
    ) -> Result<(), PkiError> {
        let data = retry(&self.retry, cancel, "fetch_crl", || {
            self.client.fetch_crl(binary)
        })
        .await
        .map_err(|e| e.into_pki(PkiError::FetchFailed))?;
        sink.write_crl(&data).await.map_err(PkiError::WriteFailed)
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
