use serde::{Deserialize, Serialize};

/// Certificate bundle as returned by the CA or persisted by a sink. All
/// members are PEM encoded. CSRs never travel in a bundle, the sign flow
/// reads them straight from its sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertData {
    pub certificate: Vec<u8>,
    #[serde(default)]
    pub private_key: Option<Vec<u8>>,
    #[serde(default)]
    pub ca_data: Option<Vec<u8>>,
}

impl CertData {
    pub fn new(certificate: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate: certificate.into(),
            ..Default::default()
        }
    }

    pub fn with_private_key(mut self, private_key: impl Into<Vec<u8>>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    pub fn with_ca_data(mut self, ca_data: impl Into<Vec<u8>>) -> Self {
        self.ca_data = Some(ca_data.into());
        self
    }
}

/// Outcome of signing a CSR. Never carries a private key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub certificate: Vec<u8>,
    #[serde(default)]
    pub ca_data: Option<Vec<u8>>,
    pub serial: String,
}
