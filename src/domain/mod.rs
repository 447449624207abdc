//! Domain types shared by every layer: accounts, messages, units of work,
//! and the ports the application layer talks to.

pub mod account;
pub mod message;
pub mod ports;
pub mod unit_of_work;
