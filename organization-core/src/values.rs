//! `organization-values` config map inside the organization namespace

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use crate::PROJECT_NAME;
use crate::error::Error;
use crate::naming::{MANAGED_BY_LABEL, namespace_name};
use crate::store::ClusterStore;

pub const VALUES_CONFIG_MAP: &str = "organization-values";
pub const VALUES_KEY: &str = "values";
pub const NOTES_ANNOTATION: &str = "giantswarm.io/notes";

/// Desired values config map of an organization
pub fn desired_config_map(organization: &str, base_domain: &str) -> Result<ConfigMap, Error> {
    let values = BTreeMap::from([("baseDomain", base_domain)]);
    let rendered = serde_yaml::to_string(&values)?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(VALUES_CONFIG_MAP.to_string()),
            namespace: Some(namespace_name(organization)),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                PROJECT_NAME.to_string(),
            )])),
            annotations: Some(BTreeMap::from([(
                NOTES_ANNOTATION.to_string(),
                format!("DO NOT EDIT. Values managed by {PROJECT_NAME}."),
            )])),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(VALUES_KEY.to_string(), rendered)])),
        ..ConfigMap::default()
    })
}

fn contains(current: Option<&BTreeMap<String, String>>, desired: Option<&BTreeMap<String, String>>) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    desired
        .iter()
        .all(|(key, value)| current.and_then(|c| c.get(key)) == Some(value))
}

pub struct ValuesEnsurer {
    store: Arc<dyn ClusterStore>,
    base_domain: String,
}

impl ValuesEnsurer {
    pub fn new(store: Arc<dyn ClusterStore>, base_domain: impl Into<String>) -> Self {
        Self {
            store,
            base_domain: base_domain.into(),
        }
    }

    /// Returns whether anything was written
    pub async fn ensure(&self, organization: &str) -> Result<bool, Error> {
        let desired = desired_config_map(organization, &self.base_domain)?;
        let namespace = namespace_name(organization);

        let Some(current) = self.store.get_config_map(&namespace, VALUES_CONFIG_MAP).await? else {
            match self.store.create_config_map(&desired).await {
                Ok(()) => {
                    info!(%namespace, "created organization values");
                    return Ok(true);
                }
                Err(err) if err.is_already_exists() => {
                    // Lost a race with another cycle, patch below.
                }
                Err(err) => return Err(err.into()),
            }
            self.store.patch_config_map(&desired).await?;
            return Ok(true);
        };

        let up_to_date = contains(current.data.as_ref(), desired.data.as_ref())
            && contains(current.metadata.labels.as_ref(), desired.metadata.labels.as_ref())
            && contains(
                current.metadata.annotations.as_ref(),
                desired.metadata.annotations.as_ref(),
            );
        if up_to_date {
            debug!(%namespace, "organization values up to date");
            return Ok(false);
        }

        info!(%namespace, "updating organization values");
        self.store.patch_config_map(&desired).await?;
        Ok(true)
    }
}
