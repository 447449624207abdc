use crate::domain::account::Account;
use crate::domain::ports::AccountStore;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing account rows.
pub const CF_ACCOUNTS: &str = "accounts";

/// A persistent account store using RocksDB.
///
/// Accounts are keyed by name and serialized as JSON in their own Column
/// Family. `store_all` goes through a `WriteBatch`, so a ledger commit lands
/// on disk entirely or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBAccountStore {
    db: Arc<DB>,
}

impl RocksDBAccountStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "accounts" column family exists.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn accounts_cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_ACCOUNTS).ok_or_else(|| {
            TransferError::InternalError(Box::new(std::io::Error::other(
                "Accounts column family not found",
            )))
        })
    }

    fn decode(bytes: &[u8]) -> Result<Account> {
        serde_json::from_slice(bytes).map_err(|e| {
            TransferError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Deserialization error: {}", e),
            )))
        })
    }
}

#[async_trait]
impl AccountStore for RocksDBAccountStore {
    async fn store_all(&self, accounts: Vec<Account>) -> Result<()> {
        let cf = self.accounts_cf()?;

        let mut batch = WriteBatch::default();
        for account in &accounts {
            let value = serde_json::to_vec(account).map_err(|e| {
                TransferError::InternalError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Serialization error: {}", e),
                )))
            })?;
            batch.put_cf(cf, account.name.as_bytes(), value);
        }
        self.db.write(batch)?;

        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Account>> {
        let cf = self.accounts_cf()?;
        match self.db.get_pinned_cf(cf, name.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let cf = self.accounts_cf()?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(Self::decode(&value)?);
        }

        Ok(accounts)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let cf = self.accounts_cf()?;
        self.db.delete_cf(cf, name.as_bytes())?;
        Ok(())
    }
}
