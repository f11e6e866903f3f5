//! spool-broker — the coordinating network service.
//!
//! One broker per host holds all shared mutable state: pending task
//! assignments, reported results, and named FIFO queues. Everything else
//! (workers, queue users, the spawning side) talks to it over framed TCP
//! on loopback.

pub mod global;
mod server;
mod state;

pub use server::Broker;
pub use state::{BrokerState, ClientEntry, NamedQueue};
