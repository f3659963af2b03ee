//! # Library Bus
//!
//! The topic-exchange AMQP event bus (spec §4.4): durable per-service
//! queues, an alternate exchange for unroutable salvage, a dead-letter
//! exchange, TTL-delayed retry queues, mandatory publish with
//! back-pressure, auto-reconnect with fail-fast, and a background
//! unroutable-message salvager.
//!
//! [`EventBus`] is the single entry point every service builds once at
//! startup (spec §4.4.2/§9 "Global mutable state"); nothing in this crate
//! reaches for ambient process-wide state.

mod bus;
mod consumer;
mod error;
mod handlers;
mod publisher;
mod reconnect;
mod salvager;
mod topology;

pub use bus::{EventBus, HealthStatus};
pub use error::{BusError, BusResult};
pub use handlers::{Handler, HandlerFuture, HandlerId};
pub use reconnect::ReconnectState;
