use crate::domain::message::Message;
use crate::domain::unit_of_work::UnitOfWorkId;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The message being routed, together with the unit of work it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub uow: UnitOfWorkId,
    pub message: Message,
}

/// A custom route step. Returning an error rolls the whole route back.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &str {
        "process"
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<()>;
}

/// One step of a route. Amounts come from the message payload.
#[derive(Clone)]
pub enum Step {
    Debit { account: String },
    Credit { account: String },
    /// Always fails; used to inject faults.
    Fail { reason: String },
    /// Stages the message for `queue`.
    To { queue: String },
    Process(Arc<dyn Processor>),
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::Debit { account } => format!("debit({account})"),
            Step::Credit { account } => format!("credit({account})"),
            Step::Fail { reason } => format!("fail({reason})"),
            Step::To { queue } => format!("to({queue})"),
            Step::Process(p) => format!("process({})", p.name()),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A source queue and the ordered steps applied, as one unit of work, to
/// every message taken from it.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub from: String,
    pub steps: Vec<Step>,
}

impl Route {
    pub fn from_queue(queue: &str) -> Self {
        Self {
            name: queue.to_string(),
            from: queue.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn debit(self, account: &str) -> Self {
        self.step(Step::Debit {
            account: account.to_string(),
        })
    }

    pub fn credit(self, account: &str) -> Self {
        self.step(Step::Credit {
            account: account.to_string(),
        })
    }

    pub fn fail(self, reason: &str) -> Self {
        self.step(Step::Fail {
            reason: reason.to_string(),
        })
    }

    pub fn to(self, queue: &str) -> Self {
        self.step(Step::To {
            queue: queue.to_string(),
        })
    }

    pub fn process(self, processor: Arc<dyn Processor>) -> Self {
        self.step(Step::Process(processor))
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Serializable form of a step, as written in configuration files:
/// `{"debit": "foo"}`, `{"to": "out"}`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDefinition {
    Debit(String),
    Credit(String),
    Fail(String),
    To(String),
}

impl From<StepDefinition> for Step {
    fn from(def: StepDefinition) -> Self {
        match def {
            StepDefinition::Debit(account) => Step::Debit { account },
            StepDefinition::Credit(account) => Step::Credit { account },
            StepDefinition::Fail(reason) => Step::Fail { reason },
            StepDefinition::To(queue) => Step::To { queue },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub name: String,
    pub from: String,
    pub steps: Vec<StepDefinition>,
}

impl From<RouteDefinition> for Route {
    fn from(def: RouteDefinition) -> Self {
        Route {
            name: def.name,
            from: def.from,
            steps: def.steps.into_iter().map(Step::from).collect(),
        }
    }
}

impl RouteDefinition {
    /// The three transfer routes from `source` to `target`: one that
    /// succeeds, one that fails between the two ledger updates, and one that
    /// fails after both updates but before the outgoing enqueue.
    pub fn samples(source: &str, target: &str) -> Vec<Self> {
        use StepDefinition::*;

        let fault = || Fail("forced exception for test".to_string());
        let debit = || Debit(source.to_string());
        let credit = || Credit(target.to_string());

        vec![
            Self {
                name: "transfer-one".to_string(),
                from: "transaction.incoming.one".to_string(),
                steps: vec![debit(), credit(), To("transaction.outgoing.one".to_string())],
            },
            Self {
                name: "transfer-two".to_string(),
                from: "transaction.incoming.two".to_string(),
                steps: vec![
                    debit(),
                    fault(),
                    credit(),
                    To("transaction.outgoing.two".to_string()),
                ],
            },
            Self {
                name: "transfer-three".to_string(),
                from: "transaction.incoming.three".to_string(),
                steps: vec![
                    debit(),
                    credit(),
                    fault(),
                    To("transaction.outgoing.three".to_string()),
                ],
            },
        ]
    }
}
