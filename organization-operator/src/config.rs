//! Operator configuration file
//!
//! ```toml
//! resync_period_secs = 300
//!
//! [reconciler]
//! force_delete_namespaces = false
//! set_owner_reference = true
//! base_domain = "example.gigantic.io"
//!
//! [kubernetes]
//! in_cluster = true
//!
//! [legacy]
//! companyd_address = "http://companyd:8000"
//! credentiald_address = "http://credentiald:8000"
//! timeout_secs = 15
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use organization_core::ReconcilerConfig;
use serde::{Deserialize, Serialize};

/// Full operator configuration; every section is optional in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Interval of the orphan sweep and of the requeue after a converged cycle
    pub resync_period_secs: u64,
    pub reconciler: ReconcilerConfig,
    pub kubernetes: KubernetesConfig,
    pub legacy: LegacyConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_period_secs: 300,
            reconciler: ReconcilerConfig::default(),
            kubernetes: KubernetesConfig::default(),
            legacy: LegacyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub in_cluster: bool,
    pub kubeconfig: Option<PathBuf>,
}

/// Addresses of the legacy companyd and credentiald services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub companyd_address: Option<String>,
    pub credentiald_address: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            companyd_address: None,
            credentiald_address: None,
            timeout_secs: 15,
        }
    }
}

impl LegacyConfig {
    /// The legacy sync only runs when both services are reachable
    pub fn enabled(&self) -> bool {
        let set = |address: &Option<String>| address.as_deref().is_some_and(|a| !a.trim().is_empty());
        set(&self.companyd_address) && set(&self.credentiald_address)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OperatorConfig {
    /// Read the TOML file at `path`, or start from the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.reconciler.validate()?;
        if self.resync_period_secs == 0 {
            bail!("resync_period_secs must be greater than zero");
        }
        if self.legacy.timeout_secs == 0 {
            bail!("legacy.timeout_secs must be greater than zero");
        }
        let partial = self.legacy.companyd_address.is_some() != self.legacy.credentiald_address.is_some();
        if partial {
            tracing::warn!("only one legacy service address is set, legacy sync stays disabled");
        }
        Ok(())
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }
}
