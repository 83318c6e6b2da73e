//! In-memory fakes of the ports, shared by the unit tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::crd::{Organization, OrganizationSpec, OrganizationStatus};
use crate::directory::{Credential, EntryFields, LegacyDirectory};
use crate::error::{DirectoryError, StoreError};
use crate::metrics::Metrics;
use crate::store::{ClusterStore, Deletion};

pub fn timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
}

pub fn organization(name: &str) -> Organization {
    Organization::new(name, OrganizationSpec::default())
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub fn secret(namespace: &str, name: &str, labels: &[(&str, &str)], data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| {
                    (
                        (*k).to_string(),
                        k8s_openapi::ByteString(v.as_bytes().to_vec()),
                    )
                })
                .collect(),
        ),
        ..Secret::default()
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(term),
        })
}

fn merge(target: &mut Option<BTreeMap<String, String>>, extra: &BTreeMap<String, String>) {
    let map = target.get_or_insert_with(BTreeMap::new);
    map.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
}

type OrganizationHook = Box<dyn FnOnce(&mut Organization) + Send>;

#[derive(Default)]
struct State {
    organizations: BTreeMap<String, Organization>,
    namespaces: BTreeMap<String, Namespace>,
    secrets: BTreeMap<(String, String), Secret>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    version: u64,
    writes: Vec<String>,
    hooks: Vec<(&'static str, OrganizationHook)>,
    failing: BTreeSet<&'static str>,
    failing_names: BTreeSet<(&'static str, String)>,
}

impl State {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }

    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(op) {
            return Err(StoreError::Api(format!("injected failure in {op}").into()));
        }
        Ok(())
    }

    fn check_name(&self, op: &'static str, name: &str) -> Result<(), StoreError> {
        self.check(op)?;
        if self.failing_names.contains(&(op, name.to_string())) {
            return Err(StoreError::Api(format!("injected failure in {op} for {name}").into()));
        }
        Ok(())
    }

    /// Apply the first pending hook registered for `op` to the stored record
    fn run_hook(&mut self, op: &'static str, name: &str) {
        let Some(index) = self.hooks.iter().position(|(hook_op, _)| *hook_op == op) else {
            return;
        };
        let (_, hook) = self.hooks.remove(index);
        let version = self.next_version();
        if let Some(stored) = self.organizations.get_mut(name) {
            hook(stored);
            stored.metadata.resource_version = version;
        }
    }

    /// Stored record for a patch, honouring the caller's resource version
    fn patch_target(&mut self, org: &Organization) -> Result<&mut Organization, StoreError> {
        let name = org.name_any();
        let stored = self
            .organizations
            .get_mut(&name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Organization",
                name: name.clone(),
            })?;
        if org.metadata.resource_version.is_some()
            && stored.metadata.resource_version != org.metadata.resource_version
        {
            return Err(StoreError::Conflict {
                kind: "Organization",
                name,
            });
        }
        Ok(stored)
    }
}

/// Cluster store keeping objects in memory, with resource versions,
/// optimistic replace and finalizer-aware deletion
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_organization(&self, mut org: Organization) {
        let mut state = self.state.lock().unwrap();
        org.metadata.resource_version = state.next_version();
        let name = org.name_any();
        org.metadata.uid.get_or_insert_with(|| format!("uid-{name}"));
        state.organizations.insert(name, org);
    }

    pub fn insert_namespace(&self, mut namespace: Namespace) {
        let mut state = self.state.lock().unwrap();
        namespace.metadata.resource_version = state.next_version();
        state.namespaces.insert(namespace.name_any(), namespace);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let mut state = self.state.lock().unwrap();
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        state.secrets.insert(key, secret);
    }

    pub fn organization(&self, name: &str) -> Option<Organization> {
        self.state.lock().unwrap().organizations.get(name).cloned()
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().unwrap().namespaces.get(name).cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Mutating calls that succeeded, in order
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    /// Make every call of `op` fail with an API error
    pub fn fail(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    /// Make calls of `op` fail for one object name only
    pub fn fail_for(&self, op: &'static str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_names
            .insert((op, name.to_string()));
    }

    /// Run `hook` against the stored record right before the next call of
    /// `op`, simulating a concurrent writer
    pub fn before_next(
        &self,
        op: &'static str,
        hook: impl FnOnce(&mut Organization) + Send + 'static,
    ) {
        self.state.lock().unwrap().hooks.push((op, Box::new(hook)));
    }

    pub fn before_next_replace(&self, hook: impl FnOnce(&mut Organization) + Send + 'static) {
        self.before_next("replace_organization", hook);
    }

    /// Delete request as issued by a user: marks the record when it holds
    /// finalizers, removes it otherwise
    pub fn request_deletion(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let Some(org) = state.organizations.get_mut(name) else {
            return;
        };
        if org.finalizers().is_empty() {
            state.organizations.remove(name);
        } else {
            org.metadata.deletion_timestamp = Some(timestamp());
            org.metadata.resource_version = version;
        }
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("get_organization")?;
        Ok(state.organizations.get(name).cloned())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("list_organizations")?;
        Ok(state.organizations.values().cloned().collect())
    }

    async fn replace_organization(&self, org: &Organization) -> Result<Organization, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("replace_organization")?;
        let name = org.name_any();
        state.run_hook("replace_organization", &name);

        let stored = state
            .organizations
            .get(&name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Organization",
                name: name.clone(),
            })?;
        if stored.metadata.resource_version != org.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "Organization",
                name,
            });
        }

        let mut updated = org.clone();
        updated.status = stored.status.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = state.next_version();
        state.writes.push(format!("replace organization/{name}"));
        if updated.is_deleting() && updated.finalizers().is_empty() {
            state.organizations.remove(&name);
        } else {
            state.organizations.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn patch_organization_status(
        &self,
        org: &Organization,
        status: &OrganizationStatus,
    ) -> Result<Organization, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("patch_organization_status")?;
        let name = org.name_any();
        state.run_hook("patch_organization_status", &name);
        let version = state.next_version();
        let stored = state.patch_target(org)?;
        stored.status = Some(status.clone());
        stored.metadata.resource_version = version;
        let updated = stored.clone();
        state.writes.push(format!("patch organization/{name} status"));
        Ok(updated)
    }

    async fn patch_organization_annotations(
        &self,
        org: &Organization,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Organization, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("patch_organization_annotations")?;
        let name = org.name_any();
        state.run_hook("patch_organization_annotations", &name);
        let version = state.next_version();
        let stored = state.patch_target(org)?;
        merge(&mut stored.metadata.annotations, annotations);
        stored.metadata.resource_version = version;
        let updated = stored.clone();
        state
            .writes
            .push(format!("patch organization/{name} annotations"));
        Ok(updated)
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("get_namespace")?;
        Ok(state.namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("list_namespaces")?;
        Ok(state
            .namespaces
            .values()
            .filter(|ns| matches_selector(ns.labels(), label_selector))
            .cloned()
            .collect())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_namespace")?;
        let name = namespace.name_any();
        if state.namespaces.contains_key(&name) {
            return Err(StoreError::AlreadyExists {
                kind: "Namespace",
                name,
            });
        }
        let mut created = namespace.clone();
        created.metadata.resource_version = state.next_version();
        state.namespaces.insert(name.clone(), created.clone());
        state.writes.push(format!("create namespace/{name}"));
        Ok(created)
    }

    async fn patch_namespace_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        owner_references: Option<&[OwnerReference]>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("patch_namespace_metadata")?;
        let version = state.next_version();
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            })?;
        merge(&mut ns.metadata.labels, labels);
        if let Some(owners) = owner_references {
            ns.metadata.owner_references = Some(owners.to_vec());
        }
        ns.metadata.resource_version = version;
        state.writes.push(format!("patch namespace/{name} labels"));
        Ok(())
    }

    async fn clear_namespace_finalizers(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("clear_namespace_finalizers")?;
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            })?;
        ns.metadata.finalizers = None;
        if ns.metadata.deletion_timestamp.is_some() {
            state.namespaces.remove(name);
        }
        state
            .writes
            .push(format!("clear namespace/{name} finalizers"));
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<Deletion, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_name("delete_namespace", name)?;
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            })?;
        let deletion = if ns.finalizers().is_empty() {
            state.namespaces.remove(name);
            Deletion::Gone
        } else {
            ns.metadata.deletion_timestamp.get_or_insert_with(timestamp);
            Deletion::InProgress
        };
        state.writes.push(format!("delete namespace/{name}"));
        Ok(deletion)
    }

    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("list_secrets")?;
        Ok(state
            .secrets
            .values()
            .filter(|s| matches_selector(s.labels(), label_selector))
            .cloned()
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("get_secret")?;
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check("get_config_map")?;
        Ok(state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("create_config_map")?;
        let key = (config_map.namespace().unwrap_or_default(), config_map.name_any());
        if state.config_maps.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "ConfigMap",
                name: key.1,
            });
        }
        state
            .writes
            .push(format!("create configmap/{}/{}", key.0, key.1));
        state.config_maps.insert(key, config_map.clone());
        Ok(())
    }

    async fn patch_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("patch_config_map")?;
        let key = (config_map.namespace().unwrap_or_default(), config_map.name_any());
        let stored = state
            .config_maps
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "ConfigMap",
                name: key.1.clone(),
            })?;
        if let Some(labels) = &config_map.metadata.labels {
            merge(&mut stored.metadata.labels, labels);
        }
        if let Some(annotations) = &config_map.metadata.annotations {
            merge(&mut stored.metadata.annotations, annotations);
        }
        if let Some(data) = &config_map.data {
            merge(&mut stored.data, data);
        }
        state
            .writes
            .push(format!("patch configmap/{}/{}", key.0, key.1));
        Ok(())
    }
}

#[derive(Default)]
struct DirectoryState {
    entries: BTreeSet<String>,
    credentials: BTreeMap<String, Vec<Credential>>,
    calls: Vec<String>,
    unavailable: bool,
}

/// Legacy directory kept in memory
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entry(&self, id: &str) {
        self.state.lock().unwrap().entries.insert(id.to_string());
    }

    pub fn has_entry(&self, id: &str) -> bool {
        self.state.lock().unwrap().entries.contains(id)
    }

    pub fn set_credentials(&self, organization: &str, credentials: Vec<Credential>) {
        self.state
            .lock()
            .unwrap()
            .credentials
            .insert(organization.to_string(), credentials);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl LegacyDirectory for FakeDirectory {
    async fn create_entry(&self, id: &str, _fields: &EntryFields) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(DirectoryError::Transport("connection refused".into()));
        }
        state.calls.push(format!("create {id}"));
        if !state.entries.insert(id.to_string()) {
            return Err(DirectoryError::AlreadyExists(id.to_string()));
        }
        Ok(())
    }

    async fn delete_entry(&self, id: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(DirectoryError::Transport("connection refused".into()));
        }
        state.calls.push(format!("delete {id}"));
        if !state.entries.remove(id) {
            return Err(DirectoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_credentials(
        &self,
        organization: &str,
    ) -> Result<Vec<Credential>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(DirectoryError::Transport("connection refused".into()));
        }
        state.calls.push(format!("list {organization}"));
        Ok(state
            .credentials
            .get(organization)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct Recorded {
    organization_count: Option<usize>,
    units: BTreeMap<String, bool>,
    errors: u32,
    cycles: u32,
}

/// Metrics port remembering the last reported values
#[derive(Default)]
pub struct RecordingMetrics {
    recorded: Mutex<Recorded>,
}

impl RecordingMetrics {
    pub fn organization_count(&self) -> Option<usize> {
        self.recorded.lock().unwrap().organization_count
    }

    pub fn unit_exists(&self, organization: &str) -> Option<bool> {
        self.recorded.lock().unwrap().units.get(organization).copied()
    }

    pub fn errors(&self) -> u32 {
        self.recorded.lock().unwrap().errors
    }

    pub fn cycles(&self) -> u32 {
        self.recorded.lock().unwrap().cycles
    }
}

impl Metrics for RecordingMetrics {
    fn set_organization_count(&self, count: usize) {
        self.recorded.lock().unwrap().organization_count = Some(count);
    }

    fn set_unit_exists(&self, organization: &str, exists: bool) {
        self.recorded
            .lock()
            .unwrap()
            .units
            .insert(organization.to_string(), exists);
    }

    fn record_reconcile_error(&self) {
        self.recorded.lock().unwrap().errors += 1;
    }

    fn observe_reconcile_duration(&self, _elapsed: Duration) {
        self.recorded.lock().unwrap().cycles += 1;
    }
}
