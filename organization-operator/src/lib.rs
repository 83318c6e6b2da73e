//! organization-operator
//!
//! Runs the reconciliation core of `organization-core` against a live cluster:
//! cluster connection, `kube::Api` backed store, HTTP client for the legacy
//! directory, metrics facade, controller loop and the command line.

pub mod commands;
pub mod config;
pub mod controller;
pub mod kube_store;
pub mod kubeconfig;
pub mod legacy_http;
pub mod logging;
pub mod metrics;
pub mod report;

pub use config::OperatorConfig;
pub use organization_core::{PROJECT_NAME, VERSION};
