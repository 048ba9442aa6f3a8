use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueArgs {
    pub common_name: String,
    /// Requested lifetime in the CA's own duration syntax (e.g. `48h`).
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub ip_sans: Vec<String>,
    #[serde(default)]
    pub alt_names: Vec<String>,
}

pub type SignatureArgs = IssueArgs;

impl IssueArgs {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.common_name.trim().is_empty()
    }
}
