//! Cluster store port
//!
//! Lookups return `Ok(None)` for absent objects. Writes report
//! [`StoreError::AlreadyExists`], [`StoreError::NotFound`] and
//! [`StoreError::Conflict`] so callers can treat them as states.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::crd::{Organization, OrganizationStatus};
use crate::error::StoreError;

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The object is gone
    Gone,
    /// Deletion was accepted, finalizers still hold the object
    InProgress,
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, StoreError>;

    async fn list_organizations(&self) -> Result<Vec<Organization>, StoreError>;

    /// Full update, rejected with `Conflict` when the resource version is stale
    async fn replace_organization(&self, org: &Organization) -> Result<Organization, StoreError>;

    /// Merge `status` into the record. The resource version of `org`, when
    /// set, is a precondition: a newer stored record yields `Conflict`.
    async fn patch_organization_status(
        &self,
        org: &Organization,
        status: &OrganizationStatus,
    ) -> Result<Organization, StoreError>;

    /// Merge the given annotations into the record, preconditioned like
    /// [`ClusterStore::patch_organization_status`]
    async fn patch_organization_annotations(
        &self,
        org: &Organization,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Organization, StoreError>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError>;

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>, StoreError>;

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, StoreError>;

    /// Merge the given labels into the namespace, leaving other labels alone.
    /// `owner_references`, when given, replaces the whole owner list.
    async fn patch_namespace_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        owner_references: Option<&[OwnerReference]>,
    ) -> Result<(), StoreError>;

    /// Drop every metadata finalizer of the namespace
    async fn clear_namespace_finalizers(&self, name: &str) -> Result<(), StoreError>;

    async fn delete_namespace(&self, name: &str) -> Result<Deletion, StoreError>;

    /// Secrets in any namespace matching the selector
    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError>;

    /// Merge labels, annotations and data of `config_map` into the stored one
    async fn patch_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError>;
}
