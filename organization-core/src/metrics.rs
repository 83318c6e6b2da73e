//! Observability port
//!
//! The reconciler reports through this trait. The registry behind it is
//! owned by the process, never by the core.

use std::time::Duration;

pub trait Metrics: Send + Sync {
    /// Number of organizations not marked for deletion
    fn set_organization_count(&self, count: usize);

    fn set_unit_exists(&self, organization: &str, exists: bool);

    fn record_reconcile_error(&self);

    fn observe_reconcile_duration(&self, elapsed: Duration);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn set_organization_count(&self, _count: usize) {}

    fn set_unit_exists(&self, _organization: &str, _exists: bool) {}

    fn record_reconcile_error(&self) {}

    fn observe_reconcile_duration(&self, _elapsed: Duration) {}
}
