//! Create-or-adopt of organization namespaces

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::config::AdoptionPolicy;
use crate::crd::Organization;
use crate::error::{Error, StoreError};
use crate::naming::{ORGANIZATION_LABEL, desired_namespace, namespace_name};
use crate::store::ClusterStore;

/// Outcome of [`NamespaceEnsurer::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured {
    Created,
    /// Existing namespace, with the label keys that had to be patched and
    /// whether the owner reference was added
    Adopted { patched: Vec<String>, owned: bool },
    Unchanged,
    /// The namespace is being deleted and cannot be used until it is gone
    Terminating,
}

pub struct NamespaceEnsurer {
    store: Arc<dyn ClusterStore>,
    adoption: AdoptionPolicy,
    set_owner: bool,
}

impl NamespaceEnsurer {
    pub fn new(store: Arc<dyn ClusterStore>, adoption: AdoptionPolicy, set_owner: bool) -> Self {
        Self {
            store,
            adoption,
            set_owner,
        }
    }

    /// Make sure the namespace of `org` exists with the desired labels and,
    /// when enabled, the organization as its controlling owner
    pub async fn ensure(&self, org: &Organization) -> Result<Ensured, Error> {
        let organization = org.name_any();
        let owner = if self.set_owner {
            let owner = org.controller_owner_ref(&());
            if owner.is_none() {
                warn!("organization has no uid yet, namespace owner reference skipped");
            }
            owner
        } else {
            None
        };
        let desired = desired_namespace(&organization, owner.clone());
        let name = namespace_name(&organization);

        debug!(namespace = %name, "creating organization namespace");
        match self.store.create_namespace(&desired).await {
            Ok(_) => {
                info!(namespace = %name, "created organization namespace");
                return Ok(Ensured::Created);
            }
            Err(err) if err.is_already_exists() => {
                debug!(namespace = %name, "organization namespace already exists");
            }
            Err(err) => return Err(err.into()),
        }

        // Deleted between our create and this read; the next cycle recreates it.
        let Some(current) = self.store.get_namespace(&name).await? else {
            warn!(namespace = %name, "organization namespace vanished after create conflict");
            return Err(Error::Store(StoreError::NotFound {
                kind: "Namespace",
                name,
            }));
        };

        if current.metadata.deletion_timestamp.is_some() {
            info!(namespace = %name, "organization namespace is terminating, waiting for it to go");
            return Ok(Ensured::Terminating);
        }

        let current_labels = current.labels();
        if let Some(owner) = current_labels.get(ORGANIZATION_LABEL) {
            if *owner != organization && self.adoption == AdoptionPolicy::Reject {
                warn!(namespace = %name, %owner, "namespace belongs to another organization");
                return Err(Error::NamespaceCollision {
                    namespace: name,
                    owner: owner.clone(),
                });
            }
        }

        let drift: BTreeMap<String, String> = desired
            .labels()
            .iter()
            .filter(|(key, value)| current_labels.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let owners = owner.and_then(|owner| with_owner(current.owner_references(), owner, &name));
        if drift.is_empty() && owners.is_none() {
            return Ok(Ensured::Unchanged);
        }

        for (key, value) in &drift {
            info!(
                namespace = %name,
                label = %key,
                current = current_labels.get(key).map_or("", String::as_str),
                desired = %value,
                "patching organization namespace label"
            );
        }
        if owners.is_some() {
            info!(namespace = %name, "setting organization as namespace owner");
        }
        self.store
            .patch_namespace_metadata(&name, &drift, owners.as_deref())
            .await?;

        Ok(Ensured::Adopted {
            patched: drift.into_keys().collect(),
            owned: owners.is_some(),
        })
    }
}

/// Owner list with `owner` appended, or `None` when nothing should change.
/// A namespace already controlled by something else keeps its controller.
fn with_owner(
    current: &[OwnerReference],
    owner: OwnerReference,
    namespace: &str,
) -> Option<Vec<OwnerReference>> {
    if current.iter().any(|existing| existing.uid == owner.uid) {
        return None;
    }
    if let Some(controller) = current
        .iter()
        .find(|existing| existing.controller == Some(true))
    {
        warn!(
            %namespace,
            controller = %format!("{}/{}", controller.kind, controller.name),
            "namespace already has a controller, owner reference not set"
        );
        return None;
    }
    let mut owners = current.to_vec();
    owners.push(owner);
    Some(owners)
}
