use super::account::Account;
use super::unit_of_work::UnitOfWorkId;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable storage for committed account rows.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Writes every account in one atomic batch.
    async fn store_all(&self, accounts: Vec<Account>) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Option<Account>>;
    async fn get_all(&self) -> Result<Vec<Account>>;
    async fn remove(&self, name: &str) -> Result<()>;
}

pub type AccountStoreBox = Box<dyn AccountStore>;

/// A participant in a coordinated unit of work.
///
/// `commit` must be idempotent per unit-of-work id, and `rollback` must be
/// safe to call for a unit of work the resource never saw.
#[async_trait]
pub trait Resource: Send + Sync {
    fn name(&self) -> &str;
    async fn prepare(&self, uow: UnitOfWorkId) -> Result<()>;
    async fn commit(&self, uow: UnitOfWorkId) -> Result<()>;
    async fn rollback(&self, uow: UnitOfWorkId) -> Result<()>;
}

pub type ResourceRef = Arc<dyn Resource>;
