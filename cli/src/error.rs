use pkiwarden_core::{PkiError, StorageError};
use pkiwarden_vault::VaultError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("YAML Deserialization Error: {0}")]
    YamlDeError(#[from] serde_yaml::Error),
    #[error("Validation Error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
    #[error("PKI Error: {0}")]
    PkiError(#[from] PkiError),
    #[error("Storage Error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Vault Error: {0}")]
    VaultError(#[from] VaultError),
    #[error("Command Not Found\nTry 'pkiwarden --help' for more information.")]
    CommandNotFound,
    #[error("Error: argument {0} is required")]
    RequiredValue(&'static str),
    #[error("Error: illegal character\nTry 'pkiwarden --help' for more information.")]
    Encoding,
    #[error("Config Not Found")]
    ConfigNotFound,
    #[error("Invalid Config Path")]
    InvalidConfigPath,
    #[error("Invalid Config: {0}")]
    InvalidConfig(String),
    #[error("Missing Config Section: {0}")]
    MissingSection(&'static str),
}
