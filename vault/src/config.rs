use std::{fmt, time::Duration};

#[derive(Clone)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    /// PKI secrets engine mount.
    pub mount: String,
    pub role: String,
    /// KV v2 mount holding certificates obtained through ACME.
    pub kv_mount: String,
    pub acme_prefix: String,
    pub timeout: Duration,
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            mount: "pki".into(),
            role: role.into(),
            kv_mount: "secret".into(),
            acme_prefix: "acme".into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &"XXXX")
            .field("mount", &self.mount)
            .field("role", &self.role)
            .field("kv_mount", &self.kv_mount)
            .field("acme_prefix", &self.acme_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}
