//! `metrics` facade adapter
//!
//! Values go to whatever recorder the process installs; without one every
//! call is a no-op.

use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use organization_core::Metrics;

pub const ORGANIZATIONS_COUNT: &str = "organization_operator_organizations_count";
pub const NAMESPACES_EXIST: &str = "organization_operator_namespaces_exist";
pub const RECONCILE_ERRORS: &str = "organization_operator_reconcile_errors_total";
pub const RECONCILE_DURATION: &str = "organization_operator_reconcile_duration_seconds";

#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

impl FacadeMetrics {
    /// Register descriptions with the installed recorder
    pub fn describe() -> Self {
        describe_gauge!(ORGANIZATIONS_COUNT, "Number of organizations without deletion intent");
        describe_gauge!(
            NAMESPACES_EXIST,
            "Whether the namespace of an organization exists (1) or not (0)"
        );
        describe_counter!(RECONCILE_ERRORS, "Reconciliation cycles that ended in an error");
        describe_histogram!(
            RECONCILE_DURATION,
            Unit::Seconds,
            "Duration of one reconciliation cycle"
        );
        Self
    }
}

impl Metrics for FacadeMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn set_organization_count(&self, count: usize) {
        gauge!(ORGANIZATIONS_COUNT).set(count as f64);
    }

    fn set_unit_exists(&self, organization: &str, exists: bool) {
        gauge!(NAMESPACES_EXIST, "organization" => organization.to_string())
            .set(if exists { 1.0 } else { 0.0 });
    }

    fn record_reconcile_error(&self) {
        counter!(RECONCILE_ERRORS).increment(1);
    }

    fn observe_reconcile_duration(&self, elapsed: Duration) {
        histogram!(RECONCILE_DURATION).record(elapsed.as_secs_f64());
    }
}
