use chrono::Utc;
use tracing::{trace, warn};

use crate::{certificate::Certificate, error::PkiError};

pub const MIN_THRESHOLD: f64 = 20.0;
pub const MAX_THRESHOLD: f64 = 80.0;

/// Decides whether a certificate should be replaced now.
pub trait RenewalStrategy: Send + Sync {
    fn renew(&self, cert: Option<&Certificate>) -> Result<bool, PkiError>;
}

/// Fixed answer, independent of the certificate.
#[derive(Debug, Clone, Copy)]
pub struct StaticRenewal(pub bool);

impl RenewalStrategy for StaticRenewal {
    fn renew(&self, _cert: Option<&Certificate>) -> Result<bool, PkiError> {
        Ok(self.0)
    }
}

/// Renews once the remaining share of the validity window drops to the
/// threshold percentage or below.
#[derive(Debug, Clone, Copy)]
pub struct PercentageRenewal {
    threshold: f64,
}

impl PercentageRenewal {
    pub fn new(threshold: f64) -> Result<Self, PkiError> {
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
            return Err(PkiError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// Same as [`RenewalStrategy::renew`] evaluated at unix time `now`.
    pub fn renew_at(&self, cert: Option<&Certificate>, now: i64) -> Result<bool, PkiError> {
        let cert = cert.ok_or(PkiError::InvalidCertificate)?;
        let total = cert.not_after() - cert.not_before();
        if total <= 0 {
            warn!(
                "certificate {} has an empty validity window, renewing",
                cert.serial()
            );
            return Ok(true);
        }
        let remaining = cert.not_after() - now;
        let percent = (remaining as f64 * 100.0 / total as f64).max(0.0);
        trace!(
            "{:.2}% of certificate lifetime remaining, threshold {}%",
            percent,
            self.threshold
        );
        Ok(percent <= self.threshold)
    }
}

impl RenewalStrategy for PercentageRenewal {
    fn renew(&self, cert: Option<&Certificate>) -> Result<bool, PkiError> {
        self.renew_at(cert, Utc::now().timestamp())
    }
}
