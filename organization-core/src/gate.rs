//! Ordered deletion gates
//!
//! Each gate performs its share of the cleanup and tells whether the
//! finalizer may go. The reconciler stops at the first blocked gate.

use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;

use crate::crd::Organization;
use crate::error::Error;
use crate::legacy::{LegacyDeletion, LegacySync};
use crate::reaper::{NamespaceReaper, Reaped};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Clear,
    Blocked {
        reason: String,
        requeue_after: Duration,
    },
}

#[async_trait]
pub trait DeletionGate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check_and_act(&self, org: &Organization) -> Result<GateOutcome, Error>;
}

/// Holds deletion while legacy credentials reference the organization
pub struct LegacyDirectoryGate {
    sync: LegacySync,
    requeue_after: Duration,
}

impl LegacyDirectoryGate {
    pub fn new(sync: LegacySync, requeue_after: Duration) -> Self {
        Self {
            sync,
            requeue_after,
        }
    }
}

#[async_trait]
impl DeletionGate for LegacyDirectoryGate {
    fn name(&self) -> &'static str {
        "legacy-directory"
    }

    async fn check_and_act(&self, org: &Organization) -> Result<GateOutcome, Error> {
        Ok(match self.sync.sync_delete(org).await? {
            LegacyDeletion::Deleted => GateOutcome::Clear,
            LegacyDeletion::Blocked { credentials } => GateOutcome::Blocked {
                reason: format!("{} legacy credential(s) still exist", credentials.len()),
                requeue_after: self.requeue_after,
            },
        })
    }
}

/// Holds deletion until the organization namespace is gone
pub struct NamespaceGate {
    reaper: NamespaceReaper,
    requeue_after: Duration,
}

impl NamespaceGate {
    pub fn new(reaper: NamespaceReaper, requeue_after: Duration) -> Self {
        Self {
            reaper,
            requeue_after,
        }
    }
}

#[async_trait]
impl DeletionGate for NamespaceGate {
    fn name(&self) -> &'static str {
        "namespace"
    }

    async fn check_and_act(&self, org: &Organization) -> Result<GateOutcome, Error> {
        Ok(match self.reaper.reap(&org.name_any()).await? {
            Reaped::Gone | Reaped::Skipped => GateOutcome::Clear,
            Reaped::Pending => GateOutcome::Blocked {
                reason: "namespace deletion in progress".to_string(),
                requeue_after: self.requeue_after,
            },
        })
    }
}
