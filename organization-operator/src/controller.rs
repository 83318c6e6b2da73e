//! Controller loop
//!
//! Watches `Organization` records and the namespaces this operator manages,
//! hands each change to the [`Reconciler`] and runs a periodic orphan sweep
//! for namespaces whose record no longer exists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use organization_core::naming::{ORGANIZATION_LABEL, managed_selector};
use organization_core::{Error, LegacyDirectory, Organization, Outcome, Reconciler};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{LegacyConfig, OperatorConfig};
use crate::kube_store::KubeStore;
use crate::legacy_http::HttpLegacyDirectory;
use crate::metrics::FacadeMetrics;

/// Requeue delay after an optimistic concurrency conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);
/// First delay after a non-recoverable error
pub const BACKOFF_BASE: Duration = Duration::from_secs(5);
pub const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Exponential backoff per organization, reset by a successful cycle
#[derive(Debug, Default)]
pub struct Backoff {
    failures: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn reset(&self, organization: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(organization);
    }

    /// Delay before retrying `organization` after `err`
    pub fn next_delay(&self, organization: &str, err: &Error) -> Duration {
        if err.is_recoverable() {
            return CONFLICT_REQUEUE;
        }
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(organization.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        backoff_delay(*count)
    }

    /// Drop the failure counts of organizations `keep` rejects
    pub fn retain(&self, keep: impl Fn(&str) -> bool) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|organization, _| keep(organization.as_str()));
    }

    /// Number of organizations with a failure count
    pub fn tracked(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 5s, 10s, 20s, ... capped at five minutes
pub fn backoff_delay(failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.saturating_sub(1));
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_MAX)
}

/// Delay before the next cycle after a successful one
pub fn requeue_delay(outcome: Outcome, resync: Duration) -> Duration {
    match outcome {
        Outcome::Done => resync,
        Outcome::RequeueAfter(delay) => delay,
    }
}

pub struct Context {
    reconciler: Reconciler,
    backoff: Backoff,
    resync: Duration,
}

impl Context {
    pub fn new(reconciler: Reconciler, resync: Duration) -> Self {
        Self {
            reconciler,
            backoff: Backoff::default(),
            resync,
        }
    }
}

async fn reconcile(org: Arc<Organization>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = org.name_any();
    let outcome = ctx.reconciler.reconcile(&name).await?;
    ctx.backoff.reset(&name);
    Ok(Action::requeue(requeue_delay(outcome, ctx.resync)))
}

fn error_policy(org: Arc<Organization>, err: &Error, ctx: Arc<Context>) -> Action {
    let name = org.name_any();
    let delay = ctx.backoff.next_delay(&name, err);
    debug!(organization = %name, ?delay, "requeueing after error");
    Action::requeue(delay)
}

/// Route a managed namespace event to the organization it belongs to
fn namespace_to_organization(namespace: Namespace) -> Option<ObjectRef<Organization>> {
    namespace
        .labels()
        .get(ORGANIZATION_LABEL)
        .map(|name| ObjectRef::new(name))
}

pub fn legacy_directory(config: &LegacyConfig) -> Result<Option<Arc<dyn LegacyDirectory>>> {
    if !config.enabled() {
        info!("legacy directory sync disabled");
        return Ok(None);
    }
    let (Some(companyd), Some(credentiald)) = (&config.companyd_address, &config.credentiald_address)
    else {
        return Ok(None);
    };
    let directory = HttpLegacyDirectory::new(companyd.as_str(), credentiald.as_str(), config.timeout())
        .context("Failed to build legacy directory client")?;
    info!(%companyd, %credentiald, "legacy directory sync enabled");
    Ok(Some(Arc::new(directory)))
}

async fn sweep_orphans(ctx: Arc<Context>) {
    let mut ticker = tokio::time::interval(ctx.resync);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match ctx.reconciler.sweep_orphans().await {
            Ok(orphans) if orphans.is_empty() => debug!("orphan sweep found nothing"),
            Ok(orphans) => info!(?orphans, "orphan sweep cleaned up organizations"),
            Err(err) => warn!(error = %err, "orphan sweep failed"),
        }
        // Records deleted while failing never reach `reset`.
        match ctx.reconciler.known_organizations().await {
            Ok(known) => ctx.backoff.retain(|organization| known.contains(organization)),
            Err(err) => debug!(error = %err, "skipping backoff pruning"),
        }
    }
}

/// Run the controller until a termination signal arrives
pub async fn run(client: Client, config: OperatorConfig) -> Result<()> {
    config.validate()?;

    let store = Arc::new(KubeStore::new(client.clone()));
    let directory = legacy_directory(&config.legacy)?;
    let reconciler = Reconciler::new(
        config.reconciler.clone(),
        store,
        directory,
        Arc::new(FacadeMetrics::describe()),
    )?;
    info!(gates = ?reconciler.gate_names(), "deletion gates configured");

    let organizations = Api::<Organization>::all(client.clone());
    organizations
        .list(&ListParams::default().limit(1))
        .await
        .context("Organization CRD is not queryable, is it installed?")?;
    let namespaces = Api::<Namespace>::all(client);

    let ctx = Arc::new(Context::new(reconciler, config.resync_period()));
    let sweeper = tokio::spawn(sweep_orphans(ctx.clone()));

    info!("starting organization controller");
    Controller::new(organizations, watcher::Config::default())
        .watches(
            namespaces,
            watcher::Config::default().labels(&managed_selector()),
            namespace_to_organization,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(organization = %object.name, "reconciled"),
                Err(err) => debug!(error = %err, "reconcile attempt failed"),
            }
        })
        .await;

    sweeper.abort();
    info!("controller stopped");
    Ok(())
}
