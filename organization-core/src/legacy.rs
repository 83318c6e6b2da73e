//! Sync of organizations into the legacy company/credential directory
//!
//! On create the organization gets a company entry, and its subscription
//! annotation is copied from the credential secret when one exists. On
//! delete the company entry is only removed once no credential references
//! the organization anymore.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::crd::{Organization, SUBSCRIPTION_ANNOTATION};
use crate::directory::{EntryFields, LegacyDirectory};
use crate::error::{DirectoryError, Error};
use crate::naming::ORGANIZATION_LABEL;
use crate::store::ClusterStore;

/// Label value marking credential secrets
pub const CREDENTIAL_APP: &str = "credentiald";

pub const DEFAULT_CREDENTIAL_NAMESPACE: &str = "giantswarm";
pub const DEFAULT_CREDENTIAL_NAME: &str = "credential-default";

/// Secret data key holding the Azure subscription id
pub const SUBSCRIPTION_KEY: &str = "azure.azureoperator.subscriptionid";

/// Outcome of [`LegacySync::sync_delete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyDeletion {
    /// Entry removed, or was already gone
    Deleted,
    /// Credentials still reference the organization
    Blocked { credentials: Vec<String> },
}

pub struct LegacySync {
    store: Arc<dyn ClusterStore>,
    directory: Arc<dyn LegacyDirectory>,
}

impl LegacySync {
    pub fn new(store: Arc<dyn ClusterStore>, directory: Arc<dyn LegacyDirectory>) -> Self {
        Self { store, directory }
    }

    /// Returns the latest copy of the record, which differs from `org` when
    /// the subscription annotation had to be written
    pub async fn sync_create(&self, org: &Organization) -> Result<Organization, Error> {
        let org = self.ensure_subscription_annotation(org).await?;

        let id = org.legacy_name();
        debug!(legacy = %id, "creating legacy organization");
        match self.directory.create_entry(&id, &EntryFields::default()).await {
            Ok(()) => info!(legacy = %id, "created legacy organization"),
            Err(DirectoryError::AlreadyExists(_)) => {
                debug!(legacy = %id, "legacy organization already exists");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(org)
    }

    pub async fn sync_delete(&self, org: &Organization) -> Result<LegacyDeletion, Error> {
        let id = org.legacy_name();

        let credentials = self.directory.list_credentials(&id).await?;
        if !credentials.is_empty() {
            let credentials: Vec<String> = credentials.into_iter().map(|c| c.id).collect();
            info!(
                legacy = %id,
                ?credentials,
                "credentials still reference legacy organization, keeping finalizer"
            );
            return Ok(LegacyDeletion::Blocked { credentials });
        }

        debug!(legacy = %id, "deleting legacy organization");
        match self.directory.delete_entry(&id).await {
            Ok(()) => info!(legacy = %id, "deleted legacy organization"),
            Err(DirectoryError::NotFound(_)) => {
                debug!(legacy = %id, "legacy organization does not exist");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(LegacyDeletion::Deleted)
    }

    async fn ensure_subscription_annotation(
        &self,
        org: &Organization,
    ) -> Result<Organization, Error> {
        let name = org.name_any();
        let Some(secret) = self.find_credential_secret(&name).await? else {
            // Not having a credential must not block the organization.
            warn!("no credential secret found, cannot set subscription annotation");
            return Ok(org.clone());
        };

        let subscription = secret
            .data
            .as_ref()
            .and_then(|data| data.get(SUBSCRIPTION_KEY))
            .map(|value| String::from_utf8_lossy(&value.0).into_owned())
            .filter(|value| !value.is_empty());
        // Only Azure installations carry a subscription id.
        let Some(subscription) = subscription else {
            debug!(secret = %secret.name_any(), "credential secret has no subscription id");
            return Ok(org.clone());
        };

        if org.annotations().get(SUBSCRIPTION_ANNOTATION) == Some(&subscription) {
            return Ok(org.clone());
        }

        info!(%subscription, "setting subscription annotation");
        let annotations = BTreeMap::from([(SUBSCRIPTION_ANNOTATION.to_string(), subscription)]);
        Ok(self
            .store
            .patch_organization_annotations(org, &annotations)
            .await?)
    }

    /// Organization specific credential, falling back to the shared default
    async fn find_credential_secret(&self, organization: &str) -> Result<Option<Secret>, Error> {
        let selector = format!("app={CREDENTIAL_APP},{ORGANIZATION_LABEL}={organization}");
        let secrets = self.store.list_secrets(&selector).await?;
        if let Some(secret) = secrets.into_iter().next() {
            return Ok(Some(secret));
        }

        Ok(self
            .store
            .get_secret(DEFAULT_CREDENTIAL_NAMESPACE, DEFAULT_CREDENTIAL_NAME)
            .await?)
    }
}
