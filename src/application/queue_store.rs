use super::coordinator::CommitGate;
use crate::config::QueueConfig;
use crate::domain::message::Message;
use crate::domain::ports::Resource;
use crate::domain::unit_of_work::UnitOfWorkId;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Messages a unit of work has taken or produced, applied at commit.
#[derive(Default)]
struct Staged {
    received: Vec<Message>,
    sends: Vec<Message>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Message>>,
    staged: HashMap<UnitOfWorkId, Staged>,
}

impl State {
    fn depth(&self, queue: &str) -> usize {
        self.queues.get(queue).map_or(0, VecDeque::len)
    }

    fn push_back(&mut self, queue: &str, message: Message) {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message.addressed_to(queue));
    }
}

/// In-process message broker: named FIFO queues plus a dead-letter queue.
///
/// Queues are created on first use. Messages taken or produced inside a unit
/// of work stay invisible to other consumers until the unit of work finishes.
pub struct QueueStore {
    config: QueueConfig,
    gate: CommitGate,
    state: Mutex<State>,
    arrivals: Notify,
}

impl QueueStore {
    pub fn new(config: QueueConfig, gate: CommitGate) -> Self {
        Self {
            config,
            gate,
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
        }
    }

    pub fn dead_letter_queue(&self) -> &str {
        &self.config.dead_letter_queue
    }

    /// Appends a message to `queue` immediately.
    pub fn enqueue(&self, queue: &str, message: Message) -> Result<()> {
        {
            let mut state = self.state()?;
            if let Some(max_depth) = self.config.max_depth.filter(|&max| state.depth(queue) >= max) {
                return Err(TransferError::QueueFull {
                    queue: queue.to_string(),
                    max_depth,
                });
            }
            debug!(queue, message = %message.id, "Enqueued message");
            state.push_back(queue, message);
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Takes the head of `queue`, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `Ok(None)` on timeout.
    pub async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Message>> {
        self.take(queue, timeout, None).await
    }

    /// Like `dequeue`, but the message stays in flight for `uow`: commit
    /// acknowledges it, rollback hands it to the redelivery policy.
    pub async fn receive(
        &self,
        uow: UnitOfWorkId,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        self.take(queue, timeout, Some(uow)).await
    }

    /// Stages `message` for `queue`; it becomes visible when `uow` commits.
    pub fn send(&self, uow: UnitOfWorkId, queue: &str, message: &Message) -> Result<()> {
        let mut state = self.state()?;
        state
            .staged
            .entry(uow)
            .or_default()
            .sends
            .push(message.addressed_to(queue));
        Ok(())
    }

    /// Moves a message straight to the dead-letter queue.
    ///
    /// The dead-letter queue ignores the depth limit.
    pub fn dead_letter(&self, message: Message) -> Result<()> {
        {
            let mut state = self.state()?;
            self.dead_letter_locked(&mut state, message);
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    pub async fn depth(&self, queue: &str) -> Result<usize> {
        let _visible = self.gate.observe().await;
        Ok(self.state()?.depth(queue))
    }

    /// Copies the messages currently on `queue`, head first.
    pub async fn browse(&self, queue: &str) -> Result<Vec<Message>> {
        let _visible = self.gate.observe().await;
        Ok(self
            .state()?
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Names of every queue that has held a message, sorted.
    pub fn queue_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.state()?.queues.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Drops every message on `queue`, returning how many were removed.
    pub fn purge(&self, queue: &str) -> Result<usize> {
        Ok(self
            .state()?
            .queues
            .remove(queue)
            .map_or(0, |q| q.len()))
    }

    /// Drops every queue and every staged unit of work.
    pub fn clear(&self) -> Result<()> {
        *self.state()? = State::default();
        Ok(())
    }

    async fn take(
        &self,
        queue: &str,
        timeout: Duration,
        uow: Option<UnitOfWorkId>,
    ) -> Result<Option<Message>> {
        // A timeout too large to represent means waiting without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Registered before checking the queue so an arrival in between
            // still wakes us.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let _visible = self.gate.observe().await;
                let mut state = self.state()?;
                if let Some(message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    if let Some(uow) = uow {
                        state
                            .staged
                            .entry(uow)
                            .or_default()
                            .received
                            .push(message.clone());
                    }
                    debug!(queue, message = %message.id, "Dequeued message");
                    return Ok(Some(message));
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    fn dead_letter_locked(&self, state: &mut State, mut message: Message) {
        let dlq = self.config.dead_letter_queue.as_str();
        if !message.destination.is_empty() && message.destination != dlq {
            message.origin = Some(message.destination.clone());
        }
        warn!(
            message = %message.id,
            from = %message.destination,
            redeliveries = message.redelivery_count,
            "Message moved to dead-letter queue"
        );
        state.push_back(dlq, message);
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| TransferError::InternalError("queue store state poisoned".into()))
    }
}

#[async_trait]
impl Resource for QueueStore {
    fn name(&self) -> &str {
        "queues"
    }

    async fn prepare(&self, uow: UnitOfWorkId) -> Result<()> {
        let Some(max_depth) = self.config.max_depth else {
            return Ok(());
        };
        let state = self.state()?;
        let Some(staged) = state.staged.get(&uow) else {
            return Ok(());
        };

        let mut incoming: HashMap<&str, usize> = HashMap::new();
        for message in &staged.sends {
            *incoming.entry(message.destination.as_str()).or_default() += 1;
        }
        for (queue, count) in incoming {
            if state.depth(queue) + count > max_depth {
                return Err(TransferError::QueueFull {
                    queue: queue.to_string(),
                    max_depth,
                });
            }
        }
        Ok(())
    }

    async fn commit(&self, uow: UnitOfWorkId) -> Result<()> {
        {
            let mut state = self.state()?;
            let Some(staged) = state.staged.remove(&uow) else {
                return Ok(());
            };
            debug!(
                uow = %uow,
                acknowledged = staged.received.len(),
                sent = staged.sends.len(),
                "Queues committed"
            );
            for message in staged.sends {
                let queue = message.destination.clone();
                state.push_back(&queue, message);
            }
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn rollback(&self, uow: UnitOfWorkId) -> Result<()> {
        {
            let mut state = self.state()?;
            let Some(staged) = state.staged.remove(&uow) else {
                return Ok(());
            };
            let mut redeliver = Vec::new();
            for mut message in staged.received {
                message.redelivery_count += 1;
                if message.redelivery_count > self.config.max_redeliveries {
                    self.dead_letter_locked(&mut state, message);
                } else {
                    debug!(message = %message.id, redeliveries = message.redelivery_count, "Message returned for redelivery");
                    redeliver.push(message);
                }
            }
            // Pushed in reverse so the original head ends up first again.
            for message in redeliver.into_iter().rev() {
                let source = message.destination.clone();
                state
                    .queues
                    .entry(source)
                    .or_default()
                    .push_front(message);
            }
        }
        self.arrivals.notify_waiters();
        Ok(())
    }
}
