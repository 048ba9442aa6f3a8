use x509_parser::prelude::{FromDer, X509Certificate};

use crate::{
    certificate::{Certificate, CERTIFICATE_TAG},
    error::PkiError,
};

/// Verifies `cert` against the first certificate of `ca_chain` only; further
/// intermediates are ignored so trust is anchored to the immediate issuer.
pub fn verify_certificate(cert: &Certificate, ca_chain: &[u8]) -> Result<(), PkiError> {
    let first = pem::parse_many(ca_chain)
        .map_err(|e| PkiError::InvalidData(format!("ca chain: {}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| PkiError::InvalidData("empty ca chain".into()))?;
    if first.tag() != CERTIFICATE_TAG {
        return Err(PkiError::InvalidData(format!(
            "unexpected {} block in ca chain",
            first.tag()
        )));
    }
    let (_, ca) = X509Certificate::from_der(first.contents())
        .map_err(|e| PkiError::InvalidData(format!("ca certificate: {}", e)))?;
    let leaf = cert
        .x509()
        .map_err(|e| PkiError::InvalidData(e.to_string()))?;

    if !ca.is_ca() {
        return Err(PkiError::VerificationFailed(
            "trust anchor is not a CA certificate".into(),
        ));
    }
    if !ca.validity().is_valid() {
        return Err(PkiError::VerificationFailed(
            "trust anchor is outside its validity window".into(),
        ));
    }
    if leaf.issuer().as_raw() != ca.subject().as_raw() {
        return Err(PkiError::VerificationFailed(format!(
            "issued by {}, expected {}",
            leaf.issuer(),
            ca.subject()
        )));
    }
    leaf.verify_signature(Some(ca.public_key()))
        .map_err(|e| PkiError::VerificationFailed(format!("bad signature: {}", e)))?;
    if !leaf.validity().is_valid() {
        return Err(PkiError::VerificationFailed(
            "certificate is outside its validity window".into(),
        ));
    }
    Ok(())
}
