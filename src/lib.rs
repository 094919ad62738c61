//! Client for the Helix HTTP/WebSocket service.
//!
//! - [`client::HelixClient`]: stateless REST wrappers, fire-once and fail-fast.
//! - [`monitor::HelixMonitor`]: self-healing WebSocket subscription with
//!   bounded exponential-backoff reconnection and per-event handlers.
//! - [`events`]: typed views of the pushed messages.

pub mod cli;
pub mod client;
pub mod config;
pub mod demo;
pub mod display;
pub mod error;
pub mod events;
pub mod monitor;

pub use client::{HelixClient, HelixClientBuilder};
pub use config::{HelixConfig, ReconnectConfig};
pub use error::{HelixError, Result, TransportError};
pub use events::{HelixEvent, InboundMessage};
pub use monitor::{ConnectionState, HelixMonitor, HelixMonitorBuilder, LifecycleEvent, WeakMonitor};
