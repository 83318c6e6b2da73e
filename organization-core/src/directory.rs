//! Legacy company/credential directory port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// Fields stored with a legacy company entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    pub default_cluster: String,
}

impl Default for EntryFields {
    fn default() -> Self {
        Self {
            default_cluster: "deprecated".to_string(),
        }
    }
}

/// Credential still referencing an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub provider: String,
}

#[async_trait]
pub trait LegacyDirectory: Send + Sync {
    /// Fails with `AlreadyExists` when the entry is present
    async fn create_entry(&self, id: &str, fields: &EntryFields) -> Result<(), DirectoryError>;

    /// Fails with `NotFound` when the entry is absent
    async fn delete_entry(&self, id: &str) -> Result<(), DirectoryError>;

    async fn list_credentials(&self, organization: &str)
    -> Result<Vec<Credential>, DirectoryError>;
}
