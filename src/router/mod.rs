//! Event routing between worker processes.
//!
//! - [`wiring`] — template schema and declarative wiring rules
//! - [`worker`] — subprocess handles with bounded outbound queues
//! - [`supervisor`] — handshake, dispatch loop, and shutdown

pub mod supervisor;
pub mod wiring;
pub mod worker;

pub use supervisor::{Dispatched, Supervisor, SupervisorConfig, READY_TIMEOUT, SHUTDOWN_GRACE};
pub use wiring::{Column, RuleAction, RuleSource, Template, WiringRule, KNOWN_COLUMN_KINDS};
pub use worker::{WorkerCommand, WorkerHandle, OUTBOUND_QUEUE_FRAMES};
