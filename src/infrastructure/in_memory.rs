use crate::domain::account::Account;
use crate::domain::ports::AccountStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for account rows.
///
/// Uses `Arc<RwLock<HashMap<String, Account>>>` to allow shared concurrent access.
/// Ideal for testing or when persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn store_all(&self, accounts: Vec<Account>) -> Result<()> {
        // One write guard for the whole batch keeps it atomic for readers.
        let mut stored = self.accounts.write().await;
        for account in accounts {
            stored.insert(account.name.clone(), account);
        }
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(name).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.accounts.write().await.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Balance;

    #[tokio::test]
    async fn test_in_memory_account_store() {
        let store = InMemoryAccountStore::new();
        let account = Account::new("foo", Balance::new(100));

        store.store_all(vec![account.clone()]).await.unwrap();
        let retrieved = store.get("foo").await.unwrap().unwrap();
        assert_eq!(retrieved, account);

        assert!(store.get("bar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_all_overwrites_and_lists() {
        let store = InMemoryAccountStore::new();
        store
            .store_all(vec![
                Account::new("foo", Balance::new(1)),
                Account::new("bar", Balance::new(2)),
            ])
            .await
            .unwrap();
        store
            .store_all(vec![Account::new("foo", Balance::new(10))])
            .await
            .unwrap();

        let mut all = store.get_all().await.unwrap();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            all,
            vec![
                Account::new("bar", Balance::new(2)),
                Account::new("foo", Balance::new(10)),
            ]
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryAccountStore::new();
        store
            .store_all(vec![Account::new("foo", Balance::new(1))])
            .await
            .unwrap();
        store.remove("foo").await.unwrap();
        store.remove("foo").await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
