//! Streaming session primitive consumed by the lifecycle manager.
//!
//! A [`Transport`] opens a [`Session`] for one endpoint. The session reports
//! what happens on the wire as a stream of [`TransportEvent`]s and can be
//! asked to close. Transports are free to run the socket however they like;
//! [`WsTransport`] spawns one tokio task per session.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::error::TransportError;

/// Notifications emitted by a session, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Open,
    /// A text or binary frame.
    Message(Vec<u8>),
    /// Something went wrong. A `Close` is expected to follow.
    Error(TransportError),
    /// The session is over. Always the last event.
    Close,
}

/// Something that can open sessions to a URL.
///
/// `open` must not block; implementations that need I/O spawn it.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &str) -> Session;
}

/// The consumer half of one session.
#[derive(Debug)]
pub struct Session {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closer: SessionCloser,
}

/// The producer half of one session, held by the transport.
///
/// Dropping `events` without sending [`TransportEvent::Close`] is tolerated:
/// the lifecycle manager treats the end of the stream as a close.
#[derive(Debug)]
pub struct SessionDriver {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Resolves when the consumer asks for a close or drops its closer.
    pub close_requested: oneshot::Receiver<()>,
}

/// Requests the close of a session.
#[derive(Debug)]
pub struct SessionCloser {
    tx: Option<oneshot::Sender<()>>,
}

impl SessionCloser {
    /// Ask the transport to close the session.
    ///
    /// # Errors
    /// [`TransportError::AlreadyClosed`] when the session has already ended
    /// or was already asked to close.
    pub fn close(&mut self) -> Result<(), TransportError> {
        match self.tx.take() {
            Some(tx) => tx.send(()).map_err(|_| TransportError::AlreadyClosed),
            None => Err(TransportError::AlreadyClosed),
        }
    }
}

impl Session {
    /// Create a connected consumer/producer pair.
    pub fn channel() -> (Session, SessionDriver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        (
            Session {
                events: events_rx,
                closer: SessionCloser { tx: Some(close_tx) },
            },
            SessionDriver {
                events: events_tx,
                close_requested: close_rx,
            },
        )
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<TransportEvent>, SessionCloser) {
        (self.events, self.closer)
    }
}

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// Text and binary frames become [`TransportEvent::Message`]; ping/pong is
/// answered by the library; a close frame, a read error or the end of the
/// stream ends the session with [`TransportEvent::Close`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(&self, url: &str) -> Session {
        let (session, driver) = Session::channel();
        tokio::spawn(run_ws_session(url.to_string(), driver));
        session
    }
}

async fn run_ws_session(url: String, driver: SessionDriver) {
    let SessionDriver {
        events,
        mut close_requested,
    } = driver;

    let ws = tokio::select! {
        res = tokio_tungstenite::connect_async(url.as_str()) => match res {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(TransportError::Io(e.to_string())));
                let _ = events.send(TransportEvent::Close);
                return;
            }
        },
        _ = &mut close_requested => {
            debug!(url = %url, "session closed before handshake completed");
            let _ = events.send(TransportEvent::Close);
            return;
        }
    };

    let _ = events.send(TransportEvent::Open);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.into_bytes()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Message(bytes));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(url = %url, ?frame, "server sent close frame");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(TransportError::Io(e.to_string())));
                    break;
                }
                None => break,
            },
            _ = &mut close_requested => {
                if let Err(e) = sink.send(WsMessage::Close(None)).await {
                    debug!(url = %url, error = %e, "close frame not delivered");
                }
                break;
            }
        }
    }

    let _ = events.send(TransportEvent::Close);
}
