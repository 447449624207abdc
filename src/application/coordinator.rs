use crate::domain::ports::ResourceRef;
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkId, UnitOfWorkStatus};
use crate::error::{Result, TransferError};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Visibility barrier shared between the coordinator and its resources.
///
/// The coordinator holds it exclusively while fanning a commit out; committed
/// reads hold it shared. Resources must never take it inside `commit`.
#[derive(Clone, Default)]
pub struct CommitGate(Arc<RwLock<()>>);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self) -> RwLockReadGuard<'_, ()> {
        self.0.read().await
    }

    pub(crate) async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.0.write().await
    }
}

/// A unit of work whose commit reached some resources but not others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub uow: UnitOfWorkId,
    pub committed: Vec<String>,
    /// `(resource, error)` pairs still waiting for their commit.
    pub failed: Vec<(String, String)>,
}

/// Binds the registered resources into all-or-nothing units of work.
///
/// Commit is two-phase: every resource prepares, then every resource commits.
/// Resources commit in registration order.
pub struct Coordinator {
    resources: Vec<ResourceRef>,
    gate: CommitGate,
    next_id: AtomicU64,
    active: Mutex<HashSet<UnitOfWorkId>>,
    inconsistencies: Mutex<Vec<Inconsistency>>,
}

impl Coordinator {
    pub fn new(gate: CommitGate) -> Self {
        Self {
            resources: Vec::new(),
            gate,
            next_id: AtomicU64::new(0),
            active: Mutex::new(HashSet::new()),
            inconsistencies: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, resource: ResourceRef) {
        debug!(resource = resource.name(), "Registered resource");
        self.resources.push(resource);
    }

    pub fn gate(&self) -> &CommitGate {
        &self.gate
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub async fn begin(&self) -> UnitOfWork {
        let id = UnitOfWorkId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.active.lock().await.insert(id);
        debug!(uow = %id, "Unit of work started");
        UnitOfWork::new(id)
    }

    pub async fn commit(&self, uow: &mut UnitOfWork) -> Result<()> {
        self.deactivate(uow).await?;
        let id = uow.id;

        for resource in &self.resources {
            if let Err(e) = resource.prepare(id).await {
                warn!(uow = %id, resource = resource.name(), error = %e, "Prepare failed, rolling back");
                self.rollback_resources(id).await;
                uow.status = UnitOfWorkStatus::RolledBack;
                return Err(e);
            }
        }

        let _gate = self.gate.exclusive().await;
        let mut committed = Vec::new();
        let mut failed = Vec::new();
        for resource in &self.resources {
            match resource.commit(id).await {
                Ok(()) => committed.push(resource.name().to_string()),
                Err(e) if committed.is_empty() => {
                    // Nothing is visible yet, so a plain rollback still leaves
                    // every resource consistent.
                    warn!(uow = %id, resource = resource.name(), error = %e, "Commit failed before any resource applied it, rolling back");
                    self.rollback_resources(id).await;
                    uow.status = UnitOfWorkStatus::RolledBack;
                    return Err(e);
                }
                Err(e) => failed.push((resource.name().to_string(), e.to_string())),
            }
        }

        if failed.is_empty() {
            uow.status = UnitOfWorkStatus::Committed;
            debug!(uow = %id, "Unit of work committed");
            return Ok(());
        }

        error!(
            uow = %id,
            committed = ?committed,
            failed = ?failed,
            "Partial commit across resources, operator intervention required"
        );
        uow.status = UnitOfWorkStatus::InDoubt;
        let failure = TransferError::CoordinationFailure {
            uow: id,
            committed: committed.join(", "),
            failed: failed
                .iter()
                .map(|(name, e)| format!("{name}: {e}"))
                .collect::<Vec<_>>()
                .join(", "),
        };
        self.inconsistencies.lock().await.push(Inconsistency {
            uow: id,
            committed,
            failed,
        });
        Err(failure)
    }

    pub async fn rollback(&self, uow: &mut UnitOfWork) -> Result<()> {
        self.deactivate(uow).await?;
        uow.status = UnitOfWorkStatus::RolledBack;
        match self.rollback_resources(uow.id).await {
            Some(e) => Err(e),
            None => {
                debug!(uow = %uow.id, "Unit of work rolled back");
                Ok(())
            }
        }
    }

    /// Partial commits recorded so far.
    pub async fn inconsistencies(&self) -> Vec<Inconsistency> {
        self.inconsistencies.lock().await.clone()
    }

    /// Replays the commit phase for every resource that missed it.
    ///
    /// Relies on resource commits being idempotent per unit of work. Returns
    /// the number of units of work that are now fully committed.
    pub async fn recover(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.inconsistencies.lock().await);
        let _gate = self.gate.exclusive().await;

        let mut resolved = 0;
        let mut remaining = Vec::new();
        for mut entry in pending {
            let mut still_failed = Vec::new();
            for (name, previous) in entry.failed.drain(..) {
                let Some(resource) = self.resources.iter().find(|r| r.name() == name) else {
                    still_failed.push((name, previous));
                    continue;
                };
                match resource.commit(entry.uow).await {
                    Ok(()) => entry.committed.push(name),
                    Err(e) => still_failed.push((name, e.to_string())),
                }
            }

            if still_failed.is_empty() {
                info!(uow = %entry.uow, "Recovered partially committed unit of work");
                resolved += 1;
            } else {
                error!(uow = %entry.uow, failed = ?still_failed, "Recovery incomplete");
                entry.failed = still_failed;
                remaining.push(entry);
            }
        }

        self.inconsistencies.lock().await.extend(remaining);
        Ok(resolved)
    }

    async fn deactivate(&self, uow: &UnitOfWork) -> Result<()> {
        if uow.is_active() && self.active.lock().await.remove(&uow.id) {
            Ok(())
        } else {
            Err(TransferError::InactiveUnitOfWork(uow.id))
        }
    }

    /// Rolls back every resource, returning the first failure.
    async fn rollback_resources(&self, id: UnitOfWorkId) -> Option<TransferError> {
        let mut first_error = None;
        for resource in &self.resources {
            if let Err(e) = resource.rollback(id).await {
                error!(uow = %id, resource = resource.name(), error = %e, "Rollback failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error
    }
}
