use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a unit of work, unique per coordinator.
///
/// Also the replay key for resource commits: committing the same id twice
/// applies its effects once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitOfWorkId(pub u64);

impl fmt::Display for UnitOfWorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkStatus {
    Active,
    Committed,
    RolledBack,
    /// Some resources committed and others did not.
    InDoubt,
}

/// Handle returned by `Coordinator::begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    pub id: UnitOfWorkId,
    pub status: UnitOfWorkStatus,
}

impl UnitOfWork {
    pub fn new(id: UnitOfWorkId) -> Self {
        Self {
            id,
            status: UnitOfWorkStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UnitOfWorkStatus::Active
    }
}
