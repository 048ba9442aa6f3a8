use chrono::Utc;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::ParseError;

pub const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Owned snapshot of the fields the lifecycle decisions need, together with
/// the raw DER it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    serial: String,
    subject: String,
    not_before: i64,
    not_after: i64,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, ParseError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| ParseError::X509Error(e.to_string()))?;
        Ok(Self {
            der: der.to_vec(),
            serial: cert.raw_serial_as_string(),
            subject: cert.subject().to_string(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM bundle, skipping any
    /// other block types in front of it.
    pub fn from_pem(data: &[u8]) -> Result<Self, ParseError> {
        let der = first_certificate_der(data)?;
        Self::from_der(&der)
    }

    pub(crate) fn x509(&self) -> Result<X509Certificate<'_>, ParseError> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| ParseError::X509Error(e.to_string()))
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Unix timestamp, seconds.
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// Unix timestamp, seconds.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.not_after
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

pub(crate) fn first_certificate_der(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    pem::parse_many(data)?
        .into_iter()
        .find(|p| p.tag() == CERTIFICATE_TAG)
        .map(|p| p.into_contents())
        .ok_or(ParseError::NoCertificate)
}
