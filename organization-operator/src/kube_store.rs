//! `ClusterStore` backed by the Kubernetes API

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use organization_core::{ClusterStore, Deletion, Organization, OrganizationStatus, StoreError};
use serde_json::{Value, json};

pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn organizations(&self) -> Api<Organization> {
        Api::all(self.client.clone())
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Fold API errors into the store taxonomy
fn map_error(kind: &'static str, name: &str, err: kube::Error) -> StoreError {
    if let kube::Error::Api(response) = &err {
        match (response.code, response.reason.as_str()) {
            (404, _) => {
                return StoreError::NotFound {
                    kind,
                    name: name.to_string(),
                };
            }
            (409, "AlreadyExists") => {
                return StoreError::AlreadyExists {
                    kind,
                    name: name.to_string(),
                };
            }
            (409, _) => {
                return StoreError::Conflict {
                    kind,
                    name: name.to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Api(Box::new(err))
}

/// A resourceVersion in a merge patch makes the API server answer 409 when
/// the object changed since it was read
fn precondition(mut patch: Value, org: &Organization) -> Value {
    if let Some(version) = &org.metadata.resource_version {
        patch["metadata"]["resourceVersion"] = json!(version);
    }
    patch
}

fn status_patch(org: &Organization, status: &OrganizationStatus) -> Value {
    precondition(json!({ "status": status }), org)
}

fn annotations_patch(org: &Organization, annotations: &BTreeMap<String, String>) -> Value {
    precondition(json!({ "metadata": { "annotations": annotations } }), org)
}

/// Owner references are a list, so a merge patch replaces them wholesale
fn metadata_patch(
    labels: &BTreeMap<String, String>,
    owner_references: Option<&[OwnerReference]>,
) -> Value {
    let mut patch = json!({ "metadata": { "labels": labels } });
    if let Some(owners) = owner_references {
        patch["metadata"]["ownerReferences"] = json!(owners);
    }
    patch
}

fn clear_finalizers_patch() -> Value {
    json!({ "metadata": { "finalizers": null } })
}

fn selector(label_selector: &str) -> ListParams {
    ListParams::default().labels(label_selector)
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, StoreError> {
        self.organizations()
            .get_opt(name)
            .await
            .map_err(|err| map_error("Organization", name, err))
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, StoreError> {
        let list = self
            .organizations()
            .list(&ListParams::default())
            .await
            .map_err(|err| map_error("Organization", "", err))?;
        Ok(list.items)
    }

    async fn replace_organization(&self, org: &Organization) -> Result<Organization, StoreError> {
        let name = org.name_any();
        self.organizations()
            .replace(&name, &PostParams::default(), org)
            .await
            .map_err(|err| map_error("Organization", &name, err))
    }

    async fn patch_organization_status(
        &self,
        org: &Organization,
        status: &OrganizationStatus,
    ) -> Result<Organization, StoreError> {
        let name = org.name_any();
        self.organizations()
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(status_patch(org, status)),
            )
            .await
            .map_err(|err| map_error("Organization", &name, err))
    }

    async fn patch_organization_annotations(
        &self,
        org: &Organization,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Organization, StoreError> {
        let name = org.name_any();
        self.organizations()
            .patch(
                &name,
                &PatchParams::default(),
                &Patch::Merge(annotations_patch(org, annotations)),
            )
            .await
            .map_err(|err| map_error("Organization", &name, err))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        self.namespaces()
            .get_opt(name)
            .await
            .map_err(|err| map_error("Namespace", name, err))
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>, StoreError> {
        let list = self
            .namespaces()
            .list(&selector(label_selector))
            .await
            .map_err(|err| map_error("Namespace", "", err))?;
        Ok(list.items)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, StoreError> {
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await
            .map_err(|err| map_error("Namespace", &namespace.name_any(), err))
    }

    async fn patch_namespace_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        owner_references: Option<&[OwnerReference]>,
    ) -> Result<(), StoreError> {
        self.namespaces()
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(metadata_patch(labels, owner_references)),
            )
            .await
            .map_err(|err| map_error("Namespace", name, err))?;
        Ok(())
    }

    async fn clear_namespace_finalizers(&self, name: &str) -> Result<(), StoreError> {
        self.namespaces()
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(clear_finalizers_patch()),
            )
            .await
            .map_err(|err| map_error("Namespace", name, err))?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<Deletion, StoreError> {
        let response = self
            .namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|err| map_error("Namespace", name, err))?;
        // The object comes back while it is still terminating, a status once it is gone.
        if response.is_left() {
            Ok(Deletion::InProgress)
        } else {
            Ok(Deletion::Gone)
        }
    }

    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, StoreError> {
        let list = Api::<Secret>::all(self.client.clone())
            .list(&selector(label_selector))
            .await
            .map_err(|err| map_error("Secret", "", err))?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|err| map_error("Secret", name, err))
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        self.config_maps(namespace)
            .get_opt(name)
            .await
            .map_err(|err| map_error("ConfigMap", name, err))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let namespace = config_map.namespace().unwrap_or_default();
        self.config_maps(&namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|err| map_error("ConfigMap", &config_map.name_any(), err))?;
        Ok(())
    }

    async fn patch_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let namespace = config_map.namespace().unwrap_or_default();
        let name = config_map.name_any();
        self.config_maps(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(config_map))
            .await
            .map_err(|err| map_error("ConfigMap", &name, err))?;
        Ok(())
    }
}
