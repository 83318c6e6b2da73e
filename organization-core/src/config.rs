//! Reconciler settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::policy::ForbiddenPrefixes;

/// Default finalizer token placed on organizations
pub const DEFAULT_FINALIZER: &str = "security.giantswarm.io/organization-finalizer";

/// What to do with an existing namespace labelled for another organization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdoptionPolicy {
    /// Patch the organization label over the foreign value
    #[default]
    Adopt,
    /// Leave the namespace untouched and fail the cycle
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub finalizer: String,
    pub forbidden_prefixes: ForbiddenPrefixes,
    pub adoption: AdoptionPolicy,
    /// Strip foreign finalizers from the namespace before deleting it
    pub force_delete_namespaces: bool,
    /// Make the organization the controlling owner of its namespace
    pub set_owner_reference: bool,
    /// Re-read-and-retry rounds when a finalizer update conflicts
    pub conflict_retries: u32,
    pub pending_requeue_secs: u64,
    pub blocked_requeue_secs: u64,
    /// Enables the `organization-values` config map when set
    pub base_domain: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
            forbidden_prefixes: ForbiddenPrefixes::default(),
            adoption: AdoptionPolicy::default(),
            force_delete_namespaces: false,
            set_owner_reference: true,
            conflict_retries: 3,
            pending_requeue_secs: 5,
            blocked_requeue_secs: 30,
            base_domain: None,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.finalizer.is_empty() {
            return Err(Error::InvalidConfig("finalizer must not be empty".into()));
        }
        if self.conflict_retries == 0 {
            return Err(Error::InvalidConfig(
                "conflict_retries must be at least 1".into(),
            ));
        }
        if self.base_domain.as_deref() == Some("") {
            return Err(Error::InvalidConfig(
                "base_domain must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    pub fn pending_requeue(&self) -> Duration {
        Duration::from_secs(self.pending_requeue_secs)
    }

    pub fn blocked_requeue(&self) -> Duration {
        Duration::from_secs(self.blocked_requeue_secs)
    }
}
