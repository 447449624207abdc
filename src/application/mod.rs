//! Application layer: the queue store and ledger resources, the coordinator
//! binding them into units of work, and the executor running routes over
//! them.
//!
//! Everything is async on `tokio`. The ledger serializes conflicting
//! mutations with per-account locks; the queue store wakes blocked consumers
//! through a `Notify`.

pub mod coordinator;
pub mod executor;
pub mod ledger;
pub mod queue_store;
pub mod route;
pub mod system;
