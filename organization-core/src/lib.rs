//! Reconciliation core for the `Organization` custom resource
//!
//! Every organization gets exactly one namespace named `org-<name>`. This crate
//! decides, for one organization at a time, which corrective action brings the
//! cluster back in line with that rule:
//! - naming and forbidden-prefix policy
//! - create-or-adopt of the namespace, and its deletion
//! - optional sync with the legacy company/credential directory
//! - finalizer handling and the ordered deletion gates
//!
//! The cluster, the legacy directory and the metrics registry are reached
//! through the ports in [`store`], [`directory`] and [`metrics`].

pub mod config;
pub mod crd;
pub mod directory;
pub mod ensurer;
pub mod error;
pub mod finalizer;
pub mod gate;
pub mod legacy;
pub mod metrics;
pub mod naming;
pub mod policy;
pub mod reaper;
pub mod reconciler;
pub mod store;
pub mod values;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{AdoptionPolicy, ReconcilerConfig};
pub use crd::{Organization, OrganizationSpec, OrganizationStatus};
pub use directory::{Credential, EntryFields, LegacyDirectory};
pub use error::{DirectoryError, Error, StoreError};
pub use metrics::{Metrics, NoopMetrics};
pub use reconciler::{Outcome, Reconciler};
pub use store::{ClusterStore, Deletion};

/// Name reported in the managed-by label and in log output
pub const PROJECT_NAME: &str = "organization-operator";

/// Crate version, shared by every workspace member
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
