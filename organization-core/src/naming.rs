//! Namespace naming for organizations

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

use crate::PROJECT_NAME;

/// Prefix prepended to the organization name to form its namespace
pub const NAMESPACE_PREFIX: &str = "org-";

/// Label referencing the owning organization
pub const ORGANIZATION_LABEL: &str = "giantswarm.io/organization";

/// Label naming the controller that manages the object
pub const MANAGED_BY_LABEL: &str = "giantswarm.io/managed-by";

/// Derive the namespace name of an organization
pub fn namespace_name(organization: &str) -> String {
    format!("{NAMESPACE_PREFIX}{organization}")
}

/// Labels every organization namespace must carry
pub fn namespace_labels(organization: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ORGANIZATION_LABEL.to_string(), organization.to_string()),
        (MANAGED_BY_LABEL.to_string(), PROJECT_NAME.to_string()),
    ])
}

/// Label selector matching every namespace this controller manages
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={PROJECT_NAME}")
}

/// Desired namespace object for an organization, optionally owned by its record
pub fn desired_namespace(organization: &str, owner: Option<OwnerReference>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace_name(organization)),
            labels: Some(namespace_labels(organization)),
            owner_references: owner.map(|owner| vec![owner]),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}
