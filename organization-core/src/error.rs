//! Error taxonomy of the reconciliation core
//!
//! Absence and "already exists" are modelled as variants so that every call
//! site can decide whether they are a valid state. Pending deletions and
//! blocking credentials are not errors at all, see [`crate::Outcome`].

use thiserror::Error;

/// Failure reported by the cluster store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name:?} was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("store request failed: {0}")]
    Api(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to serialize patch: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Failure reported by the legacy company/credential directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("legacy entry {0:?} not found")]
    NotFound(String),

    #[error("legacy entry {0:?} already exists")]
    AlreadyExists(String),

    #[error("legacy directory request failed: {0}")]
    Transport(String),
}

/// Error returned by a reconcile cycle
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The record kept changing under us; retrying will re-read it
    #[error("organization {0:?} kept changing while updating finalizers")]
    Conflict(String),

    /// Namespace exists but belongs to another organization
    #[error("namespace {namespace:?} is labelled for organization {owner:?}")]
    NamespaceCollision { namespace: String, owner: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to render organization values: {0}")]
    Values(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether retrying soon is expected to succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Store(err) => err.is_conflict(),
            _ => false,
        }
    }
}
