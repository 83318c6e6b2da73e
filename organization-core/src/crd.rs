//! `Organization` custom resource (security.giantswarm.io/v1alpha1)

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation carrying the organization name used by the legacy directory
pub const ORIGINAL_NAME_ANNOTATION: &str = "ui.giantswarm.io/original-organization-name";

/// Annotation carrying the cloud subscription id found in the credential secret
pub const SUBSCRIPTION_ANNOTATION: &str = "subscription";

/// Desired state of an organization. Reserved for future fields.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "security.giantswarm.io",
    version = "v1alpha1",
    kind = "Organization",
    plural = "organizations",
    shortname = "org",
    shortname = "orgs",
    category = "common",
    category = "giantswarm",
    status = "OrganizationStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".status.namespace"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct OrganizationSpec {}

/// Observed state of an organization
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct OrganizationStatus {
    /// Namespace containing the resources of this organization
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl Organization {
    /// Whether deletion has been requested for this record
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Namespace recorded in status, empty until the first successful cycle
    pub fn status_namespace(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.namespace.as_str())
    }

    /// Identifier of this organization in the legacy directory
    pub fn legacy_name(&self) -> String {
        self.annotations()
            .get(ORIGINAL_NAME_ANNOTATION)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| self.name_any())
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}
