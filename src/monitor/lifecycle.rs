//! Connection lifecycle: connect, tear down, reconnect with backoff.
//!
//! ## Design
//! - One `ConnState` behind one `std::sync::Mutex` per monitor. The lock is
//!   never held across an `.await` and never while a handler runs.
//! - Every session gets a generation number. Notifications from a session
//!   that is no longer the active one are dropped, so a replaced session can
//!   neither dispatch nor schedule a reconnect.
//! - The reconnect wait is a spawned `tokio::time::sleep`, cancelled with
//!   `JoinHandle::abort`. A timer that wakes after being cancelled finds its
//!   id gone and does nothing.
//! - Spawned tasks hold a `Weak` reference; dropping the last monitor handle
//!   closes the session and lets every task wind down.
//!
//! ## State machine
//! ```text
//! Idle --connect--> Connecting --open--> Open
//! Connecting|Open --close, failures < max--> AwaitingReconnect --timer--> Connecting
//! Connecting|Open --close, failures >= max--> Terminated
//! any --disconnect--> Terminated
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::next_delay;
use super::dispatch::{DispatchOutcome, Handler, HandlerKey, HandlerRegistry};
use super::transport::{SessionCloser, Transport, TransportEvent, WsTransport};
use crate::config::ReconnectConfig;
use crate::error::{HelixError, Result, TransportError};
use crate::events::InboundMessage;

/// Lifecycle notification channel capacity.
pub const LIFECYCLE_CHANNEL_CAP: usize = 64;

/// Coarse connection state, as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// A session was opened and has not reported `Open` yet.
    Connecting,
    Open,
    /// The last session closed and a reconnect timer is pending.
    AwaitingReconnect,
    /// No further automatic reconnection will happen.
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle              => "idle",
            ConnectionState::Connecting        => "connecting",
            ConnectionState::Open              => "open",
            ConnectionState::AwaitingReconnect => "awaiting_reconnect",
            ConnectionState::Terminated        => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `max_attempts` consecutive closes without a successful open.
    MaxAttemptsExceeded { attempts: u32 },
    /// [`HelixMonitor::disconnect`] was called.
    Disconnected,
}

/// Broadcast on every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connecting { generation: u64 },
    Connected { generation: u64 },
    Disconnected { generation: u64, consecutive_failures: u32 },
    ReconnectScheduled { attempt: u32, delay: Duration },
    Terminated { reason: TerminationReason },
}

struct ActiveSession {
    generation: u64,
    closer: SessionCloser,
    started: Instant,
}

struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct ConnState {
    session: Option<ActiveSession>,
    reconnect_timer: Option<PendingTimer>,
    retry_delay: Duration,
    consecutive_failures: u32,
    generation: u64,
    timer_seq: u64,
    phase: ConnectionState,
}

struct Inner {
    url: String,
    reconnect: ReconnectConfig,
    transport: Arc<dyn Transport>,
    handlers: HandlerRegistry,
    state: Mutex<ConnState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
}

/// Self-healing subscription to the Helix WebSocket.
///
/// Cloning yields another handle to the same connection. The connection is
/// released when the last handle is dropped, so a handler that needs the
/// monitor should capture a [`WeakMonitor`] from [`downgrade`](Self::downgrade)
/// rather than a clone.
///
/// # Example
/// ```rust,ignore
/// let monitor = HelixMonitor::new("wss://helix.example/ws");
/// monitor.on("ucf_update", |msg| println!("{}", msg.payload));
/// monitor.connect();
/// // ...
/// monitor.disconnect();
/// ```
#[derive(Clone)]
pub struct HelixMonitor {
    inner: Arc<Inner>,
}

impl HelixMonitor {
    /// Monitor with default reconnect bounds over [`WsTransport`].
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_parts(url.into(), ReconnectConfig::default(), Arc::new(WsTransport))
    }

    pub fn builder(url: impl Into<String>) -> HelixMonitorBuilder {
        HelixMonitorBuilder::new(url)
    }

    fn from_parts(url: String, reconnect: ReconnectConfig, transport: Arc<dyn Transport>) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAP);
        Self {
            inner: Arc::new(Inner {
                url,
                reconnect,
                transport,
                handlers: HandlerRegistry::new(),
                state: Mutex::new(ConnState {
                    session: None,
                    reconnect_timer: None,
                    retry_delay: reconnect.initial_delay,
                    consecutive_failures: 0,
                    generation: 0,
                    timer_seq: 0,
                    phase: ConnectionState::Idle,
                }),
                lifecycle_tx,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        self.inner.reconnect
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    /// `"*"` registers the catch-all handler.
    ///
    /// Handlers live as long as the monitor. Capturing a `HelixMonitor`
    /// clone inside one keeps the connection alive after every other handle
    /// is gone; capture [`downgrade`](Self::downgrade) instead.
    pub fn on<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .register(HandlerKey::parse(event_type), Arc::new(handler) as Handler);
    }

    /// Register the catch-all handler used when no specific handler matches.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inner.handlers.register(HandlerKey::Wildcard, Arc::new(handler));
    }

    /// Remove the handler for `event_type`. Returns whether one was registered.
    pub fn off(&self, event_type: &str) -> bool {
        self.inner.handlers.remove(&HandlerKey::parse(event_type))
    }

    /// Open a fresh session, replacing any existing session or pending timer.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut state = self.inner.lock_state();
        self.inner.connect_locked(&mut state);
    }

    /// Stop for good: cancel any pending reconnect and close the session.
    ///
    /// Safe to call repeatedly and before [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let mut state = self.inner.lock_state();

        let timer = state.reconnect_timer.take();
        let session = state.session.take();
        let was_active = timer.is_some() || session.is_some();

        if let Some(timer) = timer {
            timer.handle.abort();
            debug!(timer = timer.id, "cancelled pending reconnect");
        }

        if was_active {
            // Pre-empts any reconnect the closing session would schedule.
            state.consecutive_failures = self.inner.reconnect.max_attempts;
        }

        if let Some(mut session) = session {
            if let Err(e) = session.closer.close() {
                debug!(generation = session.generation, error = %e, "session already gone on disconnect");
            }
            info!(url = %self.inner.url, generation = session.generation, "Disconnected from Helix WebSocket");
        }

        if was_active {
            state.phase = ConnectionState::Terminated;
            self.inner.emit(LifecycleEvent::Terminated {
                reason: TerminationReason::Disconnected,
            });
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock_state().phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock_state().consecutive_failures
    }

    /// Delay the next scheduled reconnect will wait.
    pub fn retry_delay(&self) -> Duration {
        self.inner.lock_state().retry_delay
    }

    /// Whether a reconnect timer is currently pending.
    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock_state().reconnect_timer.is_some()
    }

    /// Receive every lifecycle transition from now on.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle_tx.subscribe()
    }

    /// Handle that does not keep the connection alive.
    pub fn downgrade(&self) -> WeakMonitor {
        WeakMonitor {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`HelixMonitor`], safe to capture in handlers.
#[derive(Clone)]
pub struct WeakMonitor {
    inner: Weak<Inner>,
}

impl WeakMonitor {
    /// The monitor, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<HelixMonitor> {
        self.inner.upgrade().map(|inner| HelixMonitor { inner })
    }
}

impl std::fmt::Debug for WeakMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakMonitor")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl std::fmt::Debug for HelixMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("HelixMonitor")
            .field("url", &self.inner.url)
            .field("phase", &state.phase)
            .field("consecutive_failures", &state.consecutive_failures)
            .field("retry_delay", &state.retry_delay)
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is the common case.
        let _ = self.lifecycle_tx.send(event);
    }

    fn connect_locked(self: &Arc<Self>, state: &mut ConnState) {
        if let Some(mut old) = state.session.take() {
            if let Err(e) = old.closer.close() {
                warn!(generation = old.generation, error = %e, "Error closing previous connection");
            }
        }

        if let Some(timer) = state.reconnect_timer.take() {
            timer.handle.abort();
        }

        state.generation += 1;
        let generation = state.generation;
        info!(url = %self.url, generation, "Connecting to Helix WebSocket...");

        let (events, closer) = self.transport.open(&self.url).into_parts();
        state.session = Some(ActiveSession {
            generation,
            closer,
            started: Instant::now(),
        });
        state.phase = ConnectionState::Connecting;
        self.emit(LifecycleEvent::Connecting { generation });

        spawn_pump(Arc::downgrade(self), generation, events);
    }

    fn is_active(state: &ConnState, generation: u64) -> bool {
        state.session.as_ref().map(|s| s.generation) == Some(generation)
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open(generation),
            TransportEvent::Message(raw) => self.on_message(generation, &raw),
            TransportEvent::Error(err) => self.on_error(generation, &err),
            TransportEvent::Close => self.on_close(generation),
        }
    }

    fn on_open(&self, generation: u64) {
        let mut state = self.lock_state();
        let Some(session) = state.session.as_ref().filter(|s| s.generation == generation) else {
            debug!(generation, "ignoring open from replaced session");
            return;
        };
        let elapsed_ms = session.started.elapsed().as_millis() as u64;

        state.retry_delay = self.reconnect.initial_delay;
        state.consecutive_failures = 0;
        state.phase = ConnectionState::Open;
        info!(url = %self.url, generation, elapsed_ms, "Connected to Helix WebSocket");
        self.emit(LifecycleEvent::Connected { generation });
    }

    fn on_message(&self, generation: u64, raw: &[u8]) {
        let decoded = InboundMessage::decode(raw);

        // Checked after decoding, as close to dispatch as the lock allows.
        // A connect() racing in from another thread after this point can
        // still see this one frame delivered; it was received before the
        // replacement session existed.
        if !Self::is_active(&self.lock_state(), generation) {
            debug!(generation, "dropping message from replaced session");
            return;
        }

        let message = match decoded {
            Ok(m) => m,
            Err(e) => {
                warn!(generation, error = %e, "Error parsing message");
                return;
            }
        };

        match self.handlers.dispatch(&message) {
            Ok(DispatchOutcome::Unhandled) => {}
            Ok(outcome) => debug!(event = %message.event, ?outcome, "dispatched"),
            Err(panic) => error!(event = %panic.event, detail = %panic.detail, "Handler panicked"),
        }
    }

    fn on_error(&self, generation: u64, err: &TransportError) {
        if Self::is_active(&self.lock_state(), generation) {
            error!(url = %self.url, generation, error = %err, "WebSocket error");
        } else {
            debug!(generation, error = %err, "error from replaced session");
        }
    }

    fn on_close(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock_state();
        if !Self::is_active(&state, generation) {
            debug!(generation, "ignoring close from replaced session");
            return;
        }
        state.session = None;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let failures = state.consecutive_failures;
        let max = self.reconnect.max_attempts;
        self.emit(LifecycleEvent::Disconnected {
            generation,
            consecutive_failures: failures,
        });

        if failures >= max {
            state.phase = ConnectionState::Terminated;
            error!(
                url = %self.url,
                max_attempts = max,
                "Max reconnection attempts exceeded. Stopping reconnection."
            );
            self.emit(LifecycleEvent::Terminated {
                reason: TerminationReason::MaxAttemptsExceeded { attempts: max },
            });
            return;
        }

        let delay = state.retry_delay;
        info!(
            url = %self.url,
            delay_ms = delay.as_millis() as u64,
            attempt = failures,
            max_attempts = max,
            "Connection closed, reconnecting"
        );
        self.schedule_reconnect(&mut state, delay);
        state.retry_delay = next_delay(delay, self.reconnect.max_delay);
        state.phase = ConnectionState::AwaitingReconnect;
        self.emit(LifecycleEvent::ReconnectScheduled { attempt: failures, delay });
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnState, delay: Duration) {
        if let Some(old) = state.reconnect_timer.take() {
            old.handle.abort();
        }
        state.timer_seq += 1;
        let id = state.timer_seq;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect(id);
            }
        });
        state.reconnect_timer = Some(PendingTimer { id, handle });
    }

    fn fire_reconnect(self: &Arc<Self>, id: u64) {
        let mut state = self.lock_state();
        if state.reconnect_timer.as_ref().map(|t| t.id) != Some(id) {
            debug!(timer = id, "stale reconnect timer fired, ignoring");
            return;
        }
        state.reconnect_timer = None;
        self.connect_locked(&mut state);
    }
}

/// Feed one session's events into the monitor until the session ends.
fn spawn_pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else { return };
            let is_close = event == TransportEvent::Close;
            inner.handle_event(generation, event);
            if is_close {
                return;
            }
        }
        // Some transports report an error and then go silent.
        if let Some(inner) = inner.upgrade() {
            debug!(generation, "transport ended without close; treating as closed");
            inner.on_close(generation);
        }
    });
}

/// Builder for [`HelixMonitor`].
pub struct HelixMonitorBuilder {
    url: String,
    reconnect: ReconnectConfig,
    transport: Arc<dyn Transport>,
}

impl HelixMonitorBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            transport: Arc::new(WsTransport),
        }
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the first retry delay (default 1 s).
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.reconnect.initial_delay = delay;
        self
    }

    /// Override the retry delay cap (default 60 s).
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.reconnect.max_delay = delay;
        self
    }

    /// Override the consecutive-failure bound (default 10).
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Replace the WebSocket transport.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// # Errors
    /// [`HelixError::Config`] for an empty URL or invalid reconnect bounds.
    pub fn build(self) -> Result<HelixMonitor> {
        if self.url.trim().is_empty() {
            return Err(HelixError::Config("monitor url must not be empty".into()));
        }
        self.reconnect.validate()?;
        Ok(HelixMonitor::from_parts(self.url, self.reconnect, self.transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_monitor_is_idle() {
        let monitor = HelixMonitor::new("ws://localhost:1/ws");
        assert_eq!(monitor.state(), ConnectionState::Idle);
        assert_eq!(monitor.consecutive_failures(), 0);
        assert_eq!(monitor.retry_delay(), Duration::from_millis(1_000));
        assert!(!monitor.has_pending_reconnect());
    }

    #[test]
    fn disconnect_before_connect_is_noop() {
        let monitor = HelixMonitor::new("ws://localhost:1/ws");
        let mut rx = monitor.subscribe_lifecycle();
        monitor.disconnect();
        monitor.disconnect();
        assert_eq!(monitor.state(), ConnectionState::Idle);
        assert_eq!(monitor.consecutive_failures(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn builder_rejects_empty_url() {
        assert!(matches!(HelixMonitor::builder(" ").build(), Err(HelixError::Config(_))));
    }

    #[test]
    fn builder_rejects_invalid_bounds() {
        let result = HelixMonitor::builder("ws://x")
            .initial_retry_delay(Duration::from_secs(10))
            .max_retry_delay(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_applies_overrides() {
        let monitor = HelixMonitor::builder("ws://x")
            .initial_retry_delay(Duration::from_millis(50))
            .max_retry_delay(Duration::from_millis(400))
            .max_reconnect_attempts(3)
            .build()
            .unwrap();
        let rc = monitor.reconnect_config();
        assert_eq!(rc.initial_delay, Duration::from_millis(50));
        assert_eq!(rc.max_delay, Duration::from_millis(400));
        assert_eq!(rc.max_attempts, 3);
        assert_eq!(monitor.retry_delay(), Duration::from_millis(50));
    }

    #[test]
    fn on_and_off_manage_registry() {
        let monitor = HelixMonitor::new("ws://x");
        monitor.on("alert", |_| {});
        monitor.on("*", |_| {});
        monitor.on_any(|_| {});
        assert_eq!(monitor.inner.handlers.len(), 2);
        assert!(monitor.off("alert"));
        assert!(monitor.off("*"));
        assert!(monitor.inner.handlers.is_empty());
    }

    #[test]
    fn weak_handle_does_not_keep_monitor_alive() {
        let monitor = HelixMonitor::new("ws://x");
        let weak = monitor.downgrade();
        assert!(weak.upgrade().is_some());
        drop(monitor);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::AwaitingReconnect.to_string(), "awaiting_reconnect");
        assert_eq!(ConnectionState::Terminated.to_string(), "terminated");
    }
}
