//! Reconcile orchestrator
//!
//! One cycle reads the organization and takes one of three branches:
//! - record gone: remove a namespace left behind for it
//! - record deleting: run the deletion gates, then drop the finalizer
//! - record live: finalizer, namespace, values, legacy entry, status
//!
//! Nothing is remembered between cycles. Every step checks the observed
//! state first, so running a cycle again after a partial failure converges.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::ResourceExt;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ReconcilerConfig;
use crate::crd::{Organization, OrganizationStatus};
use crate::directory::LegacyDirectory;
use crate::ensurer::{Ensured, NamespaceEnsurer};
use crate::error::Error;
use crate::finalizer::Finalizers;
use crate::gate::{DeletionGate, GateOutcome, LegacyDirectoryGate, NamespaceGate};
use crate::legacy::LegacySync;
use crate::metrics::Metrics;
use crate::naming::{ORGANIZATION_LABEL, managed_selector, namespace_name};
use crate::reaper::{NamespaceReaper, Reaped};
use crate::store::ClusterStore;
use crate::values::ValuesEnsurer;

/// What the caller should do after a successful cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged, wait for the next change
    Done,
    /// Something is still settling, run again after the delay
    RequeueAfter(Duration),
}

pub struct Reconciler {
    config: ReconcilerConfig,
    store: Arc<dyn ClusterStore>,
    metrics: Arc<dyn Metrics>,
    finalizers: Finalizers,
    ensurer: NamespaceEnsurer,
    reaper: NamespaceReaper,
    values: Option<ValuesEnsurer>,
    legacy: Option<LegacySync>,
    gates: Vec<Box<dyn DeletionGate>>,
}

impl Reconciler {
    /// Build a reconciler. The legacy directory sync and its deletion gate
    /// are only wired when `directory` is given.
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn ClusterStore>,
        directory: Option<Arc<dyn LegacyDirectory>>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let mut gates: Vec<Box<dyn DeletionGate>> = Vec::new();
        if let Some(directory) = &directory {
            gates.push(Box::new(LegacyDirectoryGate::new(
                LegacySync::new(store.clone(), directory.clone()),
                config.blocked_requeue(),
            )));
        }
        gates.push(Box::new(NamespaceGate::new(
            NamespaceReaper::new(store.clone(), config.force_delete_namespaces),
            config.pending_requeue(),
        )));

        Ok(Self {
            finalizers: Finalizers::new(
                store.clone(),
                config.finalizer.clone(),
                config.conflict_retries,
            ),
            ensurer: NamespaceEnsurer::new(
                store.clone(),
                config.adoption,
                config.set_owner_reference,
            ),
            reaper: NamespaceReaper::new(store.clone(), config.force_delete_namespaces),
            values: config
                .base_domain
                .as_ref()
                .map(|domain| ValuesEnsurer::new(store.clone(), domain.clone())),
            legacy: directory.map(|directory| LegacySync::new(store.clone(), directory)),
            gates,
            store,
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Names of the deletion gates, in the order they run
    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|gate| gate.name()).collect()
    }

    /// Run one cycle for the organization called `name`
    pub async fn reconcile(&self, name: &str) -> Result<Outcome, Error> {
        let span = info_span!("reconcile", organization = %name);
        async {
            let start = Instant::now();
            let result = self.reconcile_once(name).await;
            self.metrics.observe_reconcile_duration(start.elapsed());
            match &result {
                Ok(outcome) => debug!(?outcome, "reconciliation finished"),
                Err(err) => {
                    self.metrics.record_reconcile_error();
                    warn!(error = %err, recoverable = err.is_recoverable(), "reconciliation failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_once(&self, name: &str) -> Result<Outcome, Error> {
        match self.store.get_organization(name).await? {
            None => self.cleanup_orphan(name).await,
            Some(org) if org.is_deleting() => self.reconcile_delete(&org).await,
            Some(org) => self.reconcile_live(&org).await,
        }
    }

    /// The record is gone but its namespace may still be around
    async fn cleanup_orphan(&self, name: &str) -> Result<Outcome, Error> {
        if self.config.forbidden_prefixes.is_forbidden(name) {
            return Ok(Outcome::Done);
        }

        info!("organization not found, checking for orphaned namespace");
        match self.reaper.reap_owned(name).await? {
            Reaped::Gone => {
                self.metrics.set_unit_exists(name, false);
                self.refresh_organization_count().await;
            }
            Reaped::Pending => info!("orphaned namespace is being deleted"),
            Reaped::Skipped => {}
        }
        // Without a record there is nothing left to requeue for; the namespace
        // finishes terminating on its own.
        Ok(Outcome::Done)
    }

    async fn reconcile_delete(&self, org: &Organization) -> Result<Outcome, Error> {
        let name = org.name_any();
        if !org.has_finalizer(self.finalizers.token()) {
            debug!("organization is being deleted without our finalizer");
            return Ok(Outcome::Done);
        }

        if let Some(prefix) = self.config.forbidden_prefixes.matching(&name) {
            info!(%prefix, "forbidden organization, releasing it without cleanup");
        } else {
            for gate in &self.gates {
                match gate.check_and_act(org).await? {
                    GateOutcome::Clear => debug!(gate = gate.name(), "deletion gate clear"),
                    GateOutcome::Blocked {
                        reason,
                        requeue_after,
                    } => {
                        info!(gate = gate.name(), %reason, "deletion blocked");
                        return Ok(Outcome::RequeueAfter(requeue_after));
                    }
                }
            }
        }

        self.finalizers.detach_if_present(org).await?;
        info!("organization finalized");
        self.metrics.set_unit_exists(&name, false);
        self.refresh_organization_count().await;
        Ok(Outcome::Done)
    }

    async fn reconcile_live(&self, org: &Organization) -> Result<Outcome, Error> {
        let name = org.name_any();
        if let Some(prefix) = self.config.forbidden_prefixes.matching(&name) {
            info!(%prefix, "organization name starts with a forbidden prefix, ignoring it");
            return Ok(Outcome::Done);
        }

        let newly_attached = !org.has_finalizer(self.finalizers.token());
        let Some(org) = self.finalizers.attach_if_absent(org).await? else {
            info!("organization disappeared while adding finalizer");
            return Ok(Outcome::Done);
        };

        if self.ensurer.ensure(&org).await? == Ensured::Terminating {
            info!("previous organization namespace still terminating, retrying later");
            return Ok(Outcome::RequeueAfter(self.config.pending_requeue()));
        }
        self.metrics.set_unit_exists(&name, true);

        if let Some(values) = &self.values {
            values.ensure(&name).await?;
        }

        let org = match &self.legacy {
            Some(legacy) => legacy.sync_create(&org).await?,
            None => org,
        };

        let namespace = namespace_name(&name);
        if org.status_namespace() != namespace {
            info!(%namespace, "recording organization namespace in status");
            self.store
                .patch_organization_status(&org, &OrganizationStatus { namespace })
                .await?;
        }

        if newly_attached {
            self.refresh_organization_count().await;
        }
        Ok(Outcome::Done)
    }

    /// Reconcile every organization whose managed namespace outlived its record.
    /// A failing orphan is logged and skipped; the next sweep retries it.
    /// Returns the organizations that were cleaned up.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>, Error> {
        let namespaces = self.store.list_namespaces(&managed_selector()).await?;

        let mut orphans = Vec::new();
        for namespace in namespaces {
            let Some(organization) = namespace.labels().get(ORGANIZATION_LABEL).cloned() else {
                continue;
            };
            match self.store.get_organization(&organization).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    warn!(%organization, error = %err, "failed to look up organization during sweep");
                    continue;
                }
            }
            match self.reconcile(&organization).await {
                Ok(_) => orphans.push(organization),
                Err(err) => {
                    warn!(%organization, error = %err, "orphan cleanup failed, continuing sweep");
                }
            }
        }
        Ok(orphans)
    }

    /// Names of all organization records currently in the cluster
    pub async fn known_organizations(&self) -> Result<BTreeSet<String>, Error> {
        let orgs = self.store.list_organizations().await?;
        Ok(orgs.iter().map(ResourceExt::name_any).collect())
    }

    async fn refresh_organization_count(&self) {
        match self.store.list_organizations().await {
            Ok(orgs) => {
                let live = orgs.iter().filter(|org| !org.is_deleting()).count();
                self.metrics.set_organization_count(live);
            }
            Err(err) => warn!(error = %err, "failed to count organizations"),
        }
    }
}
