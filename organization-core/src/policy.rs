//! Forbidden organization names
//!
//! Organizations whose name starts with a protected prefix would shadow
//! system namespaces, so the controller leaves them alone.

use serde::{Deserialize, Serialize};

/// Prefixes reserved for system namespaces
pub const DEFAULT_FORBIDDEN_PREFIXES: &[&str] =
    &["default", "kube-", "monitoring", "gatekeeper", "draughtsman"];

/// Set of protected organization name prefixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForbiddenPrefixes(Vec<String>);

impl ForbiddenPrefixes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(prefixes.into_iter().map(Into::into).collect())
    }

    /// First protected prefix `organization` starts with, if any
    pub fn matching(&self, organization: &str) -> Option<&str> {
        self.0
            .iter()
            .map(String::as_str)
            .find(|prefix| organization.starts_with(prefix))
    }

    pub fn is_forbidden(&self, organization: &str) -> bool {
        self.matching(organization).is_some()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for ForbiddenPrefixes {
    fn default() -> Self {
        Self::new(DEFAULT_FORBIDDEN_PREFIXES.iter().copied())
    }
}
