use super::coordinator::CommitGate;
use crate::config::LedgerConfig;
use crate::domain::account::{Account, Amount, Balance};
use crate::domain::ports::{AccountStoreBox, Resource};
use crate::domain::unit_of_work::UnitOfWorkId;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Staged effects of one unit of work.
#[derive(Default)]
struct Pending {
    /// Row locks held until commit or rollback.
    guards: HashMap<String, OwnedMutexGuard<()>>,
    /// Working copies, read back by later steps of the same unit of work.
    working: HashMap<String, Account>,
    prepared: bool,
}

/// Balance store with staged, all-or-nothing mutations.
///
/// Every account a unit of work touches is locked on first touch and stays
/// locked until that unit of work finishes, so concurrent transfers on the same
/// account serialize instead of losing updates. Nothing reaches the backing
/// `AccountStore` before commit.
pub struct Ledger {
    store: AccountStoreBox,
    config: LedgerConfig,
    gate: CommitGate,
    rows: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    pending: Mutex<HashMap<UnitOfWorkId, Pending>>,
}

impl Ledger {
    pub fn new(store: AccountStoreBox, config: LedgerConfig, gate: CommitGate) -> Self {
        Self {
            store,
            config,
            gate,
            rows: std::sync::Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an account outside of any unit of work.
    pub async fn open_account(&self, name: &str, balance: Balance) -> Result<Account> {
        let account = Account::new(name, balance);
        account.validate()?;

        let _row = self.lock_row(name).await?;
        if self.store.get(name).await?.is_some() {
            return Err(TransferError::ValidationError(format!(
                "Account '{name}' already exists"
            )));
        }
        self.store.store_all(vec![account.clone()]).await?;
        info!(account = name, balance = balance.0, "Account opened");
        Ok(account)
    }

    pub async fn close_account(&self, name: &str) -> Result<()> {
        let _row = self.lock_row(name).await?;
        if self.store.get(name).await?.is_none() {
            return Err(TransferError::AccountNotFound(name.to_string()));
        }
        self.store.remove(name).await?;
        info!(account = name, "Account closed");
        Ok(())
    }

    /// Committed balance of an account.
    pub async fn balance(&self, name: &str) -> Result<Balance> {
        let _visible = self.gate.observe().await;
        self.store
            .get(name)
            .await?
            .map(|a| a.balance)
            .ok_or_else(|| TransferError::AccountNotFound(name.to_string()))
    }

    /// Balance as seen from inside a unit of work, including its own staged
    /// mutations.
    pub async fn balance_in(&self, uow: UnitOfWorkId, name: &str) -> Result<Balance> {
        if let Some(account) = self
            .pending
            .lock()
            .await
            .get(&uow)
            .and_then(|p| p.working.get(name))
        {
            return Ok(account.balance);
        }
        self.balance(name).await
    }

    /// All committed accounts, ordered by name.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let _visible = self.gate.observe().await;
        let mut accounts = self.store.get_all().await?;
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    pub async fn total(&self) -> Result<Balance> {
        Ok(self.accounts().await?.into_iter().map(|a| a.balance).sum())
    }

    pub async fn debit(&self, uow: UnitOfWorkId, name: &str, amount: Amount) -> Result<Balance> {
        self.mutate(uow, name, |account| account.debit(amount)).await
    }

    pub async fn credit(&self, uow: UnitOfWorkId, name: &str, amount: Amount) -> Result<Balance> {
        self.mutate(uow, name, |account| account.credit(amount)).await
    }

    async fn mutate<F>(&self, uow: UnitOfWorkId, name: &str, apply: F) -> Result<Balance>
    where
        F: FnOnce(&mut Account) -> Result<()>,
    {
        let touched = {
            let pending = self.pending.lock().await;
            match pending.get(&uow) {
                Some(p) if p.prepared => return Err(TransferError::InactiveUnitOfWork(uow)),
                Some(p) => p.guards.contains_key(name),
                None => false,
            }
        };

        if !touched {
            // The pending map is not held while waiting, other units of work
            // must be able to finish and release this row.
            let guard = self.lock_row(name).await?;
            let account = self
                .store
                .get(name)
                .await?
                .ok_or_else(|| TransferError::AccountNotFound(name.to_string()))?;

            let mut pending = self.pending.lock().await;
            let entry = pending.entry(uow).or_default();
            entry.guards.insert(name.to_string(), guard);
            entry.working.insert(name.to_string(), account);
        }

        let mut pending = self.pending.lock().await;
        let account = pending
            .get_mut(&uow)
            .and_then(|p| p.working.get_mut(name))
            .ok_or(TransferError::InactiveUnitOfWork(uow))?;
        apply(account)?;
        debug!(uow = %uow, account = name, balance = account.balance.0, "Staged ledger mutation");
        Ok(account.balance)
    }

    async fn lock_row(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
        let row = {
            let mut rows = self.rows.lock().map_err(|_| {
                TransferError::InternalError("ledger row lock table poisoned".into())
            })?;
            rows.entry(name.to_string()).or_default().clone()
        };
        tokio::time::timeout(self.config.lock_timeout(), row.lock_owned())
            .await
            .map_err(|_| TransferError::LockTimeout(name.to_string()))
    }
}

#[async_trait]
impl Resource for Ledger {
    fn name(&self) -> &str {
        "ledger"
    }

    async fn prepare(&self, uow: UnitOfWorkId) -> Result<()> {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get_mut(&uow) else {
            return Ok(());
        };
        for account in entry.working.values() {
            account.validate()?;
        }
        entry.prepared = true;
        Ok(())
    }

    async fn commit(&self, uow: UnitOfWorkId) -> Result<()> {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get(&uow) else {
            debug!(uow = %uow, "Nothing staged in ledger, commit is a no-op");
            return Ok(());
        };

        let accounts: Vec<Account> = entry.working.values().cloned().collect();
        let touched = accounts.len();
        // Kept staged until the write succeeds so the commit can be replayed.
        self.store.store_all(accounts).await?;
        pending.remove(&uow);
        debug!(uow = %uow, accounts = touched, "Ledger committed");
        Ok(())
    }

    async fn rollback(&self, uow: UnitOfWorkId) -> Result<()> {
        if let Some(entry) = self.pending.lock().await.remove(&uow) {
            debug!(uow = %uow, accounts = entry.working.len(), "Ledger mutations discarded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryAccountStore;
    use std::time::Duration;

    async fn ledger_with(accounts: &[(&str, i64)], lock_timeout_ms: u64) -> Ledger {
        let ledger = Ledger::new(
            Box::new(InMemoryAccountStore::new()),
            LedgerConfig { lock_timeout_ms },
            CommitGate::new(),
        );
        for (name, balance) in accounts {
            ledger.open_account(name, Balance::new(*balance)).await.unwrap();
        }
        ledger
    }

    fn amount(value: i64) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_mutations_invisible_until_commit() {
        let ledger = ledger_with(&[("foo", 1000), ("bar", 1000)], 100).await;
        let uow = UnitOfWorkId(1);

        ledger.debit(uow, "foo", amount(100)).await.unwrap();
        ledger.credit(uow, "bar", amount(100)).await.unwrap();

        assert_eq!(ledger.balance_in(uow, "foo").await.unwrap(), Balance::new(900));
        assert_eq!(ledger.balance("foo").await.unwrap(), Balance::new(1000));

        ledger.prepare(uow).await.unwrap();
        ledger.commit(uow).await.unwrap();

        assert_eq!(ledger.balance("foo").await.unwrap(), Balance::new(900));
        assert_eq!(ledger.balance("bar").await.unwrap(), Balance::new(1100));
    }

    #[tokio::test]
    async fn test_repeated_mutations_accumulate() {
        let ledger = ledger_with(&[("foo", 1000)], 100).await;
        let uow = UnitOfWorkId(1);

        ledger.debit(uow, "foo", amount(100)).await.unwrap();
        let after = ledger.debit(uow, "foo", amount(50)).await.unwrap();
        assert_eq!(after, Balance::new(850));
    }

    #[tokio::test]
    async fn test_rollback_discards_and_releases_locks() {
        let ledger = ledger_with(&[("foo", 1000)], 50).await;

        ledger.debit(UnitOfWorkId(1), "foo", amount(100)).await.unwrap();
        ledger.rollback(UnitOfWorkId(1)).await.unwrap();

        assert_eq!(ledger.balance("foo").await.unwrap(), Balance::new(1000));
        // The row is free again.
        ledger.debit(UnitOfWorkId(2), "foo", amount(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_rejects_negative_balance() {
        let ledger = ledger_with(&[("foo", 50)], 100).await;
        let uow = UnitOfWorkId(1);

        ledger.debit(uow, "foo", amount(100)).await.unwrap();
        assert!(matches!(
            ledger.prepare(uow).await,
            Err(TransferError::ValidationError(_))
        ));
        ledger.rollback(uow).await.unwrap();
        assert_eq!(ledger.balance("foo").await.unwrap(), Balance::new(50));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = ledger_with(&[], 100).await;
        assert!(matches!(
            ledger.credit(UnitOfWorkId(1), "ghost", amount(1)).await,
            Err(TransferError::AccountNotFound(_))
        ));
        assert!(matches!(
            ledger.balance("ghost").await,
            Err(TransferError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_conflicting_unit_of_work_times_out() {
        let ledger = ledger_with(&[("foo", 1000)], 20).await;

        ledger.debit(UnitOfWorkId(1), "foo", amount(1)).await.unwrap();
        assert!(matches!(
            ledger.debit(UnitOfWorkId(2), "foo", amount(1)).await,
            Err(TransferError::LockTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_waiting_unit_of_work_sees_committed_value() {
        let ledger = Arc::new(ledger_with(&[("foo", 1000)], 1_000).await);

        ledger.debit(UnitOfWorkId(1), "foo", amount(100)).await.unwrap();

        let waiter = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.debit(UnitOfWorkId(2), "foo", amount(100)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        ledger.prepare(UnitOfWorkId(1)).await.unwrap();
        ledger.commit(UnitOfWorkId(1)).await.unwrap();

        // No lost update: the second debit starts from 900.
        assert_eq!(waiter.await.unwrap().unwrap(), Balance::new(800));
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let ledger = ledger_with(&[("foo", 1000)], 100).await;
        let uow = UnitOfWorkId(7);

        ledger.credit(uow, "foo", amount(5)).await.unwrap();
        ledger.prepare(uow).await.unwrap();
        ledger.commit(uow).await.unwrap();
        ledger.commit(uow).await.unwrap();

        assert_eq!(ledger.balance("foo").await.unwrap(), Balance::new(1005));
    }

    #[tokio::test]
    async fn test_mutation_after_prepare_is_rejected() {
        let ledger = ledger_with(&[("foo", 1000)], 100).await;
        let uow = UnitOfWorkId(1);

        ledger.credit(uow, "foo", amount(5)).await.unwrap();
        ledger.prepare(uow).await.unwrap();
        assert!(matches!(
            ledger.credit(uow, "foo", amount(5)).await,
            Err(TransferError::InactiveUnitOfWork(_))
        ));
    }

    #[tokio::test]
    async fn test_open_and_close_account() {
        let ledger = ledger_with(&[("foo", 10)], 100).await;

        assert!(matches!(
            ledger.open_account("foo", Balance::new(1)).await,
            Err(TransferError::ValidationError(_))
        ));
        assert!(ledger.open_account("neg", Balance::new(-1)).await.is_err());

        ledger.open_account("bar", Balance::new(5)).await.unwrap();
        assert_eq!(ledger.total().await.unwrap(), Balance::new(15));

        ledger.close_account("foo").await.unwrap();
        let names: Vec<String> = ledger
            .accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["bar".to_string()]);
    }
}
