use pkiwarden_core::{PercentageRenewal, RenewalStrategy, RetryConfig, StaticRenewal};
use pkiwarden_types::IssueArgs;
use pkiwarden_vault::VaultConfig;
use serde::Deserialize;
use std::{
    env,
    fmt::Debug,
    fs,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, trace};
use validator::{Validate, ValidationError};

use crate::error::CliError;

const TOKEN_ENV: &str = "VAULT_TOKEN";

#[derive(Deserialize, Validate, Debug)]
pub struct Config {
    #[validate]
    pub vault: Vault,
    #[serde(default)]
    #[validate]
    pub renewal: Renewal,
    #[validate]
    pub certificate: Certificate,
    #[serde(default)]
    #[validate]
    pub destinations: Vec<Destination>,
    pub csr: Option<Csr>,
    pub ca_output: Option<String>,
    pub crl_output: Option<String>,
    #[serde(default)]
    pub daemon: Daemon,
    #[serde(default)]
    pub retry: Retry,
}

#[derive(Deserialize, Validate)]
pub struct Vault {
    #[validate(url)]
    pub address: String,
    pub token: Option<String>,
    #[serde(default = "_default_mount")]
    pub mount: String,
    #[validate(length(min = 1))]
    pub role: String,
    #[serde(default = "_default_kv_mount")]
    pub kv_mount: String,
    #[serde(default = "_default_acme_prefix")]
    pub acme_prefix: String,
    #[serde(default = "_default_timeout")]
    #[validate(range(min = 1))]
    pub timeout: u64,
}

impl Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "XXXX"))
            .field("mount", &self.mount)
            .field("role", &self.role)
            .field("kv_mount", &self.kv_mount)
            .field("acme_prefix", &self.acme_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Vault {
    pub fn client_config(&self) -> Result<VaultConfig, CliError> {
        let token = self
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or(CliError::RequiredValue("vault.token"))?;
        let mut config = VaultConfig::new(&self.address, token, &self.role);
        config.mount = self.mount.clone();
        config.kv_mount = self.kv_mount.clone();
        config.acme_prefix = self.acme_prefix.clone();
        config.timeout = Duration::from_secs(self.timeout);
        Ok(config)
    }
}

#[derive(Deserialize, Validate, Debug, Default)]
#[validate(schema(function = "Self::verify"))]
pub struct Renewal {
    #[validate(range(min = 20.0, max = 80.0))]
    pub threshold: Option<f64>,
    pub always: Option<bool>,
}

impl Renewal {
    pub fn verify(&self) -> Result<(), ValidationError> {
        if self.threshold.is_some() && self.always.is_some() {
            return Err(ValidationError::new(
                "renewal takes either threshold or always, not both",
            ));
        }
        Ok(())
    }

    pub fn strategy(&self) -> Result<Box<dyn RenewalStrategy>, CliError> {
        if let Some(always) = self.always {
            return Ok(Box::new(StaticRenewal(always)));
        }
        let threshold = self.threshold.unwrap_or(_default_threshold());
        Ok(Box::new(PercentageRenewal::new(threshold)?))
    }
}

#[derive(Deserialize, Validate, Debug)]
pub struct Certificate {
    #[validate(length(min = 1))]
    pub common_name: String,
    pub ttl: Option<String>,
    #[serde(default)]
    pub ip_sans: Vec<String>,
    #[serde(default)]
    pub alt_names: Vec<String>,
}

impl Certificate {
    pub fn issue_args(&self) -> IssueArgs {
        IssueArgs {
            common_name: self.common_name.clone(),
            ttl: self.ttl.clone(),
            ip_sans: self.ip_sans.clone(),
            alt_names: self.alt_names.clone(),
        }
    }
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct Destination {
    pub cert: Option<String>,
    pub ca: Option<String>,
    #[validate(length(min = 1))]
    pub key: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Csr {
    pub csr: String,
    pub cert: String,
    pub ca: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Daemon {
    #[serde(default = "_default_interval")]
    pub interval: u64,
}

impl Default for Daemon {
    fn default() -> Self {
        Self {
            interval: _default_interval(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct Retry {
    #[serde(default = "_default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "_default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "_default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: _default_max_retries(),
            initial_delay_ms: _default_initial_delay_ms(),
            max_delay_ms: _default_max_delay_ms(),
        }
    }
}

impl Retry {
    pub fn config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

impl Config {
    pub fn load(path: Option<String>) -> Result<Self, CliError> {
        trace!("loading config");
        let path = match path {
            Some(path) => expand_path(path)?,
            None => default_paths()
                .into_iter()
                .find(|f| {
                    let found = f.is_file();
                    trace!("config file {:?}: {}", f, if found { "found" } else { "not found" });
                    found
                })
                .ok_or(CliError::ConfigNotFound)?,
        };
        debug!("loading config file: {:?}", path);
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let mut file = fs::File::open(path)?;
        let mut configuration_data = String::new();
        file.read_to_string(&mut configuration_data)?;
        trace!("parsing config file");
        serde_yaml::from_str(&configuration_data)
            .map_err(|e| CliError::InvalidConfig(e.to_string()))
    }
}

/// Current dir, user config dir, `~/.pkiwarden` and `/etc/pkiwarden`, in
/// lookup order.
fn default_paths() -> Vec<PathBuf> {
    let file = |mut d: PathBuf| {
        d.push("pkiwarden");
        d.set_extension("yaml");
        d
    };
    let mut paths = Vec::new();
    paths.extend(env::current_dir().ok().map(file));
    paths.extend(dirs::config_dir().map(|d| file(d.join("pkiwarden"))));
    paths.extend(dirs::home_dir().map(|d| file(d.join(".pkiwarden"))));
    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc/pkiwarden/pkiwarden.yaml"));
    }
    paths
}

/// Resolves a leading `~/` against the home directory.
pub fn expand_path(path: impl Into<PathBuf>) -> Result<PathBuf, CliError> {
    let path = path.into();
    if let Some(stripped_path) = path.strip_prefix("~/").ok().filter(|_| !cfg!(windows)) {
        let home_dir = dirs::home_dir().ok_or(CliError::InvalidConfigPath)?;
        Ok(home_dir.join(stripped_path))
    } else {
        Ok(path)
    }
}

fn _default_mount() -> String {
    "pki".to_string()
}

fn _default_kv_mount() -> String {
    "secret".to_string()
}

fn _default_acme_prefix() -> String {
    "acme".to_string()
}

fn _default_timeout() -> u64 {
    30
}

fn _default_threshold() -> f64 {
    33.0
}

fn _default_interval() -> u64 {
    60 * 60
}

fn _default_max_retries() -> u32 {
    3
}

fn _default_initial_delay_ms() -> u64 {
    500
}

fn _default_max_delay_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(yaml: &str) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        Config::from_file(file.path()).unwrap()
    }

    const MINIMAL: &str = "
vault:
  address: https://vault.local:8200
  token: s.secret
  role: web
certificate:
  common_name: www.example.com
destinations:
  - key: /tmp/www.pem
";

    #[test]
    fn applies_defaults() {
        let conf = parse(MINIMAL);
        conf.validate().unwrap();
        assert_eq!(conf.vault.mount, "pki");
        assert_eq!(conf.vault.kv_mount, "secret");
        assert_eq!(conf.vault.acme_prefix, "acme");
        assert_eq!(conf.vault.timeout, 30);
        assert_eq!(conf.daemon.interval, 3600);
        assert_eq!(conf.retry.config().max_retries, 3);
        assert_eq!(conf.retry.config().initial_delay, Duration::from_millis(500));
        assert!(conf.renewal.strategy().is_ok());
    }

    #[test]
    fn redacts_token() {
        let conf = parse(MINIMAL);
        let printed = format!("{:?}", conf);
        assert!(!printed.contains("s.secret"));
        assert!(printed.contains("XXXX"));
        let client = conf.vault.client_config().unwrap();
        assert_eq!(client.token, "s.secret");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let conf = parse(&format!("{}renewal:\n  threshold: 90\n", MINIMAL));
        assert!(conf.validate().is_err());
        let conf = parse(&format!("{}renewal:\n  threshold: 50\n  always: true\n", MINIMAL));
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_bad_address() {
        let conf = parse(&MINIMAL.replace("https://vault.local:8200", "not a url"));
        assert!(conf.validate().is_err());
    }

    #[test]
    fn static_renewal() {
        let conf = parse(&format!("{}renewal:\n  always: true\n", MINIMAL));
        conf.validate().unwrap();
        let strategy = conf.renewal.strategy().unwrap();
        assert!(strategy.renew(None).unwrap());
    }

    #[test]
    fn explicit_path_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let conf = Config::load(Some(path)).unwrap();
        assert_eq!(conf.certificate.common_name, "www.example.com");
        assert!(default_paths()
            .iter()
            .all(|p| p.file_name().is_some_and(|n| n == "pkiwarden.yaml")));
    }

    #[test]
    fn invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"vault: [").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(CliError::InvalidConfig(_))
        ));
    }
}
