use super::coordinator::{CommitGate, Coordinator};
use super::executor::RouteExecutor;
use super::ledger::Ledger;
use super::queue_store::QueueStore;
use super::route::Route;
use crate::config::Config;
use crate::domain::ports::AccountStoreBox;
use crate::error::Result;
use std::sync::Arc;

/// The wired components: queue store and ledger registered with one
/// coordinator, and an executor running routes over them.
pub struct TransferSystem {
    pub queues: Arc<QueueStore>,
    pub ledger: Arc<Ledger>,
    pub coordinator: Arc<Coordinator>,
    pub executor: RouteExecutor,
    pub routes: Vec<Route>,
}

impl TransferSystem {
    /// Builds a system from configuration. The ledger is registered first, so
    /// it commits before the queues.
    pub fn new(config: Config, store: AccountStoreBox) -> Result<Self> {
        config.validate()?;

        let gate = CommitGate::new();
        let queues = Arc::new(QueueStore::new(config.queues, gate.clone()));
        let ledger = Arc::new(Ledger::new(store, config.ledger, gate.clone()));

        let mut coordinator = Coordinator::new(gate);
        coordinator.register(ledger.clone());
        coordinator.register(queues.clone());
        let coordinator = Arc::new(coordinator);

        let executor = RouteExecutor::new(
            coordinator.clone(),
            queues.clone(),
            ledger.clone(),
            config.executor,
        );
        let routes = config.routes.into_iter().map(Route::from).collect();

        Ok(Self {
            queues,
            ledger,
            coordinator,
            executor,
            routes,
        })
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// Route consuming from `queue`, if any.
    pub fn route_from(&self, queue: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.from == queue)
    }
}
