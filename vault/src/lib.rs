mod client;
pub mod config;
pub mod error;

pub use client::VaultClient;
pub use config::VaultConfig;
pub use error::VaultError;
