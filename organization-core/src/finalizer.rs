//! Finalizer handling on organization records
//!
//! Updates are full replaces against the resource version that was read, so
//! a concurrent writer makes the store answer `Conflict`. On conflict the
//! record is read again and the change re-applied, a bounded number of times.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use crate::crd::Organization;
use crate::error::Error;
use crate::store::ClusterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Attach,
    Detach,
}

pub struct Finalizers {
    store: Arc<dyn ClusterStore>,
    token: String,
    attempts: u32,
}

impl Finalizers {
    pub fn new(store: Arc<dyn ClusterStore>, token: impl Into<String>, attempts: u32) -> Self {
        Self {
            store,
            token: token.into(),
            attempts: attempts.max(1),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Add the finalizer unless present. Returns the up to date record, or
    /// `None` when it disappeared meanwhile.
    pub async fn attach_if_absent(&self, org: &Organization) -> Result<Option<Organization>, Error> {
        self.update(org, Change::Attach).await
    }

    /// Remove the finalizer if present. Returns the record as left in the
    /// store, `None` once the store dropped it.
    pub async fn detach_if_present(&self, org: &Organization) -> Result<Option<Organization>, Error> {
        self.update(org, Change::Detach).await
    }

    async fn update(&self, org: &Organization, change: Change) -> Result<Option<Organization>, Error> {
        let name = org.name_any();
        let mut current = org.clone();

        for attempt in 1..=self.attempts {
            let present = current.has_finalizer(&self.token);
            let mut desired = current.clone();
            match change {
                Change::Attach if present => return Ok(Some(current)),
                Change::Detach if !present => return Ok(Some(current)),
                // The API refuses new finalizers once deletion started; the
                // next cycle takes the deletion branch instead.
                Change::Attach if current.is_deleting() => return Err(Error::Conflict(name)),
                Change::Attach => desired.finalizers_mut().push(self.token.clone()),
                Change::Detach => desired.finalizers_mut().retain(|f| f != &self.token),
            }

            match self.store.replace_organization(&desired).await {
                Ok(updated) => {
                    info!(finalizer = %self.token, ?change, "updated organization finalizers");
                    return Ok(Some(updated));
                }
                Err(err) if err.is_conflict() => {
                    debug!(attempt, "organization changed concurrently, reading it again");
                    match self.store.get_organization(&name).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(None),
                    }
                }
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::Conflict(name))
    }
}
