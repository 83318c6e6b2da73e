//! Deletion of organization namespaces

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use crate::error::Error;
use crate::naming::{ORGANIZATION_LABEL, namespace_name};
use crate::store::{ClusterStore, Deletion};

/// Outcome of [`NamespaceReaper::reap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaped {
    /// No namespace left
    Gone,
    /// Deletion is still in flight
    Pending,
    /// Namespace is labelled for another organization and was left alone
    Skipped,
}

pub struct NamespaceReaper {
    store: Arc<dyn ClusterStore>,
    force: bool,
}

impl NamespaceReaper {
    pub fn new(store: Arc<dyn ClusterStore>, force: bool) -> Self {
        Self { store, force }
    }

    /// Delete the namespace of `organization` unconditionally
    pub async fn reap(&self, organization: &str) -> Result<Reaped, Error> {
        self.reap_matching(organization, false).await
    }

    /// Delete the namespace only when its organization label names `organization`
    pub async fn reap_owned(&self, organization: &str) -> Result<Reaped, Error> {
        self.reap_matching(organization, true).await
    }

    async fn reap_matching(&self, organization: &str, owned_only: bool) -> Result<Reaped, Error> {
        let name = namespace_name(organization);
        let Some(namespace) = self.store.get_namespace(&name).await? else {
            debug!(namespace = %name, "organization namespace does not exist");
            return Ok(Reaped::Gone);
        };

        if owned_only
            && namespace.labels().get(ORGANIZATION_LABEL).map(String::as_str) != Some(organization)
        {
            info!(namespace = %name, "namespace is not labelled for this organization, leaving it");
            return Ok(Reaped::Skipped);
        }

        if self.force && !namespace.finalizers().is_empty() {
            info!(
                namespace = %name,
                finalizers = ?namespace.finalizers(),
                "removing finalizers from organization namespace"
            );
            match self.store.clear_namespace_finalizers(&name).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => return Ok(Reaped::Gone),
                Err(err) => return Err(err.into()),
            }
        }

        if namespace.metadata.deletion_timestamp.is_some() {
            info!(namespace = %name, "waiting for deletion of organization namespace");
            return Ok(Reaped::Pending);
        }

        info!(namespace = %name, "deleting organization namespace");
        match self.store.delete_namespace(&name).await {
            Ok(Deletion::Gone) => {
                info!(namespace = %name, "deleted organization namespace");
                Ok(Reaped::Gone)
            }
            Ok(Deletion::InProgress) => Ok(Reaped::Pending),
            Err(err) if err.is_not_found() => Ok(Reaped::Gone),
            Err(err) => Err(err.into()),
        }
    }
}
