#![allow(dead_code)]

use std::time::Duration;
use txbridge::application::system::TransferSystem;
use txbridge::config::Config;
use txbridge::domain::account::Balance;
use txbridge::domain::message::Message;
use txbridge::infrastructure::in_memory::InMemoryAccountStore;

pub const INCOMING_ONE: &str = "transaction.incoming.one";
pub const INCOMING_TWO: &str = "transaction.incoming.two";
pub const INCOMING_THREE: &str = "transaction.incoming.three";
pub const OUTGOING_ONE: &str = "transaction.outgoing.one";
pub const OUTGOING_TWO: &str = "transaction.outgoing.two";
pub const OUTGOING_THREE: &str = "transaction.outgoing.three";
pub const DLQ: &str = "DLQ";

pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// An isolated system with `foo` and `bar` seeded at 1000 each.
pub struct Fixture {
    pub system: TransferSystem,
}

impl Fixture {
    pub async fn setup() -> Self {
        Self::setup_with(Config::default()).await
    }

    pub async fn setup_with(config: Config) -> Self {
        let system = TransferSystem::new(config, Box::new(InMemoryAccountStore::new()))
            .expect("valid configuration");
        system.ledger.open_account("foo", Balance::new(1000)).await.unwrap();
        system.ledger.open_account("bar", Balance::new(1000)).await.unwrap();
        Self { system }
    }

    pub async fn teardown(self) {
        for account in self.system.ledger.accounts().await.unwrap() {
            self.system.ledger.close_account(&account.name).await.unwrap();
        }
        self.system.queues.clear().unwrap();
    }

    pub fn send(&self, queue: &str, amount: i64) -> Message {
        let message = Message::new(amount);
        self.system.queues.enqueue(queue, message.clone()).unwrap();
        message
    }

    pub async fn balance(&self, name: &str) -> i64 {
        self.system.ledger.balance(name).await.unwrap().0
    }

    pub async fn depth(&self, queue: &str) -> usize {
        self.system.queues.depth(queue).await.unwrap()
    }

    /// Drains the route consuming from `queue`.
    pub async fn drain(&self, queue: &str) {
        let route = self
            .system
            .route_from(queue)
            .expect("route for queue")
            .clone();
        self.system.executor.run_until_idle(&route).await.unwrap();
    }
}
