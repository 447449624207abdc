use super::coordinator::Coordinator;
use super::ledger::Ledger;
use super::queue_store::QueueStore;
use super::route::{Exchange, Route, Step};
use crate::config::ExecutorConfig;
use crate::domain::account::Amount;
use crate::domain::message::MessageId;
use crate::error::{Result, TransferError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of one message through a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Received,
    Processing,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub route: String,
    pub message_id: MessageId,
    pub state: RouteState,
    /// Why the route rolled back, if it did.
    pub error: Option<String>,
}

/// Runs routes: each message is received, processed and committed inside its
/// own unit of work.
#[derive(Clone)]
pub struct RouteExecutor {
    coordinator: Arc<Coordinator>,
    queues: Arc<QueueStore>,
    ledger: Arc<Ledger>,
    config: ExecutorConfig,
}

impl RouteExecutor {
    pub fn new(
        coordinator: Arc<Coordinator>,
        queues: Arc<QueueStore>,
        ledger: Arc<Ledger>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            coordinator,
            queues,
            ledger,
            config,
        }
    }

    /// Processes at most one message from the route's source queue.
    ///
    /// Returns `Ok(None)` when no message arrived within `timeout`. Step and
    /// validation failures are reported in the outcome, not as errors; only a
    /// coordination failure is returned as `Err`.
    pub async fn process_next(&self, route: &Route, timeout: Duration) -> Result<Option<RouteOutcome>> {
        let mut uow = self.coordinator.begin().await;

        let message = match self.queues.receive(uow.id, &route.from, timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                self.coordinator.rollback(&mut uow).await?;
                return Ok(None);
            }
            Err(e) => {
                self.coordinator.rollback(&mut uow).await?;
                return Err(e);
            }
        };

        let message_id = message.id;
        self.transition(route, message_id, RouteState::Received);
        self.transition(route, message_id, RouteState::Processing);

        let mut exchange = Exchange {
            uow: uow.id,
            message,
        };
        let failure = match self.run_steps(route, &mut exchange).await {
            Ok(()) => match self.coordinator.commit(&mut uow).await {
                Ok(()) => None,
                Err(e) if e.is_recoverable() => Some(e),
                Err(e) => {
                    error!(route = %route.name, message = %message_id, error = %e, "Route left resources inconsistent");
                    return Err(e);
                }
            },
            Err(e) => {
                self.coordinator.rollback(&mut uow).await?;
                Some(e)
            }
        };

        let outcome = match failure {
            None => {
                self.transition(route, message_id, RouteState::Committed);
                info!(route = %route.name, message = %message_id, "Route committed");
                RouteOutcome {
                    route: route.name.clone(),
                    message_id,
                    state: RouteState::Committed,
                    error: None,
                }
            }
            Some(e) => {
                self.transition(route, message_id, RouteState::RolledBack);
                warn!(route = %route.name, message = %message_id, error = %e, "Route rolled back");
                RouteOutcome {
                    route: route.name.clone(),
                    message_id,
                    state: RouteState::RolledBack,
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(Some(outcome))
    }

    /// Processes messages until the source queue stays empty for one poll
    /// timeout.
    pub async fn run_until_idle(&self, route: &Route) -> Result<Vec<RouteOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next(route, self.config.poll_timeout()).await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Runs `route` on its own task until the worker is stopped.
    pub fn spawn(&self, route: Route) -> RouteWorker {
        let (shutdown, mut stopped) = watch::channel(false);
        let executor = self.clone();
        let poll = self.config.poll_timeout();

        let handle = tokio::spawn(async move {
            info!(route = %route.name, from = %route.from, "Route worker started");
            let mut processed = 0;
            // Shutdown is only checked between units of work so none is
            // abandoned half way.
            loop {
                let stop = *stopped.borrow_and_update();
                if stop {
                    break;
                }
                match executor.process_next(&route, poll).await {
                    Ok(Some(_)) => processed += 1,
                    Ok(None) => {}
                    Err(e) => {
                        error!(route = %route.name, error = %e, "Route worker stopped on fatal error");
                        return Err(e);
                    }
                }
            }
            info!(route = %route.name, processed, "Route worker stopped");
            Ok(processed)
        });

        RouteWorker { shutdown, handle }
    }

    async fn run_steps(&self, route: &Route, exchange: &mut Exchange) -> Result<()> {
        for (index, step) in route.steps.iter().enumerate() {
            if self.config.trace {
                debug!(
                    route = %route.name,
                    uow = %exchange.uow,
                    message = %exchange.message.id,
                    index,
                    step = %step.describe(),
                    "Executing step"
                );
            }
            self.apply(step, exchange).await?;
        }
        Ok(())
    }

    async fn apply(&self, step: &Step, exchange: &mut Exchange) -> Result<()> {
        match step {
            Step::Debit { account } => {
                let amount = Amount::new(exchange.message.payload)?;
                self.ledger.debit(exchange.uow, account, amount).await?;
            }
            Step::Credit { account } => {
                let amount = Amount::new(exchange.message.payload)?;
                self.ledger.credit(exchange.uow, account, amount).await?;
            }
            Step::Fail { reason } => {
                return Err(TransferError::StepFailed {
                    step: step.describe(),
                    reason: reason.clone(),
                });
            }
            Step::To { queue } => {
                self.queues.send(exchange.uow, queue, &exchange.message)?;
            }
            Step::Process(processor) => {
                processor.process(exchange).await?;
            }
        }
        Ok(())
    }

    fn transition(&self, route: &Route, message: MessageId, state: RouteState) {
        if self.config.trace {
            debug!(route = %route.name, message = %message, state = ?state, "Route state");
        }
    }
}

/// Handle to a running route worker.
pub struct RouteWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<usize>>,
}

impl RouteWorker {
    /// Stops the worker after its current unit of work and returns how many
    /// messages it processed.
    pub async fn stop(self) -> Result<usize> {
        // The worker may already have exited on a fatal error.
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| TransferError::InternalError(Box::new(e)))?
    }
}
