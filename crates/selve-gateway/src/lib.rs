//! Selve Gateway Engine
//!
//! Async protocol engine for the Selve USB-RF gateway. One background worker
//! owns the transport's read half and routes every inbound frame: responses
//! resolve pending calls, events update the entity registry and reach
//! subscribers. Calls are issued concurrently from any task through a
//! cloneable [`Gateway`] handle; writes are serialized behind a single lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use selve_gateway::{EntityKind, Gateway, GatewayConfig, Interest};
//!
//! let gateway = Gateway::connect_tcp("10.0.0.5:7000", GatewayConfig::default()).await?;
//! gateway.discover_all().await?;
//!
//! gateway.subscribe(Interest::Kind(EntityKind::Device), |n| {
//!     println!("{:?}", n);
//!     Ok(())
//! });
//!
//! gateway.set_position(5, 50).await?;
//! gateway.disconnect().await?;
//! ```

mod actions;
mod config;
mod discovery;
mod dispatcher;
mod entity;
mod error;
mod gateway;
mod registry;
mod router;
mod transport;
mod worker;

pub use config::GatewayConfig;
pub use entity::*;
pub use error::*;
pub use gateway::Gateway;
pub use registry::{Applied, Registry};
pub use router::{GatewayStatus, Interest, Notification, SubscriberError, SubscriptionHandle};
pub use transport::{connect_tcp, Transport};
#[cfg(feature = "serial")]
pub use transport::connect_serial;
pub use worker::WorkerState;

pub use selve_protocol as protocol;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
