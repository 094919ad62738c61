//! # HelixMonitor
//!
//! Resilient subscription to the Helix WebSocket push stream.
//!
//! ## What It Does
//!
//! 1. **Lifecycle**: keeps exactly one live session open, replacing it after
//!    an unexpected close. Gives up after a bounded number of consecutive
//!    failures, or immediately on [`HelixMonitor::disconnect`].
//! 2. **Backoff**: waits `min(initial * 2^(k-1), max)` before the k-th
//!    consecutive reconnect.
//! 3. **Dispatch**: decodes each frame as JSON and routes it to the handler
//!    registered for its `event` name, else the catch-all, else a log line.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let monitor = HelixMonitor::builder("wss://helix.example/ws")
//!     .max_reconnect_attempts(10)
//!     .build()?;
//! monitor.on("alert", |msg| println!("{}", msg.payload));
//! monitor.connect();
//! ```

pub mod backoff;
pub mod dispatch;
pub mod lifecycle;
pub mod transport;

pub use backoff::{delay_for_attempt, next_delay};
pub use dispatch::{DispatchOutcome, Handler, HandlerKey, HandlerPanic, HandlerRegistry, WILDCARD};
pub use lifecycle::{
    ConnectionState, HelixMonitor, HelixMonitorBuilder, LifecycleEvent, TerminationReason,
    WeakMonitor,
};
pub use transport::{Session, SessionCloser, SessionDriver, Transport, TransportEvent, WsTransport};
