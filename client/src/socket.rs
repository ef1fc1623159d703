//! Connection lifecycle with automatic reconnect.
//!
//! DESIGN
//! ======
//! A [`Socket`] handle fronts a spawned actor task that owns the connection.
//! The transport is abstracted behind [`Connector`]; production uses
//! tokio-tungstenite, tests inject scripted connectors.
//!
//! Reconnects use a fixed delay, not backoff: the server is expected to come
//! back on the same address within seconds, and a bounded attempt count
//! (default 10) caps the noise when it does not. After the last attempt the
//! actor parks in `GivenUp` until [`Socket::reconnect`] wakes it.
//!
//! REDESIGN NOTE
//! =============
//! Handlers are re-read from the shared list on every dispatch, so a handler
//! registered after the socket opened still sees every subsequent event.
//! Registration replaces nothing; handlers run in registration order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Capacity of the pump channels between the actor and the transport.
const TRANSPORT_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Retry budget exhausted; only [`Socket::reconnect`] leaves this state.
    GivenUp,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    pub retry_delay: Duration,
    pub max_attempts: u32,
}

impl SocketConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// A live transport: text out through `outbound`, text in through `inbound`.
/// The connection is considered closed when `inbound` yields `None`.
pub struct Connection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, SocketError>;
}

/// Production transport over tokio-tungstenite. Two pump tasks bridge the
/// websocket halves to the actor's channels; both end when the socket does.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, SocketError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(TRANSPORT_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<String>(TRANSPORT_BUFFER);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Ok(Connection { outbound: out_tx, inbound: in_rx })
    }
}

// =============================================================================
// SOCKET HANDLE
// =============================================================================

type Handler = Box<dyn Fn(&Envelope) + Send>;

struct Shared {
    status: Mutex<SocketStatus>,
    handlers: Mutex<Vec<Handler>>,
    last_event: Mutex<Option<Envelope>>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    /// Wakes the actor out of `GivenUp` or cuts a pending retry sleep short.
    wake: Notify,
}

impl Shared {
    fn set_status(&self, status: SocketStatus) {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }

    fn status(&self) -> SocketStatus {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn dispatch(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping unparseable event");
                return;
            }
        };

        *self.last_event.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(envelope.clone());

        let handlers = self.handlers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(&envelope);
        }
    }
}

/// Handle to the connection actor. Dropping it (or calling [`close`]) aborts
/// the actor along with any pending retry timer.
///
/// [`close`]: Socket::close
pub struct Socket {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl Socket {
    /// Connect over tokio-tungstenite.
    #[must_use]
    pub fn connect(config: SocketConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Connect through an injected transport.
    #[must_use]
    pub fn with_connector(config: SocketConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new(Shared {
            status: Mutex::new(SocketStatus::Idle),
            handlers: Mutex::new(Vec::new()),
            last_event: Mutex::new(None),
            outbound: Mutex::new(None),
            wake: Notify::new(),
        });

        let task = tokio::spawn(run_actor(Arc::clone(&shared), connector, config));

        Self { shared, task }
    }

    pub fn status(&self) -> SocketStatus {
        self.shared.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SocketStatus::Connected
    }

    /// The most recently parsed inbound event, if any.
    pub fn last_event(&self) -> Option<Envelope> {
        self.shared
            .last_event
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Register an event handler. Handlers run synchronously, in registration
    /// order, for every event parsed after registration.
    pub fn on_event(&self, handler: impl Fn(&Envelope) + Send + 'static) {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(handler));
    }

    /// Queue an envelope for the server. Returns `false` when there is no
    /// live connection or the outbound buffer is full.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let Ok(text) = envelope.to_json() else {
            return false;
        };
        let outbound = self.shared.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx.try_send(text).is_ok(),
            None => false,
        }
    }

    /// Restart the retry cycle. No-op while connected; otherwise resets the
    /// attempt budget and wakes the actor immediately.
    pub fn reconnect(&self) {
        if self.is_connected() {
            return;
        }
        self.shared.wake.notify_one();
    }

    /// Tear the actor down.
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// ACTOR
// =============================================================================

async fn run_actor(shared: Arc<Shared>, connector: Arc<dyn Connector>, config: SocketConfig) {
    let mut attempts: u32 = 0;

    loop {
        shared.set_status(SocketStatus::Connecting);

        match connector.connect(&config.url).await {
            Ok(Connection { outbound, mut inbound }) => {
                attempts = 0;
                *shared.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                    Some(outbound);
                shared.set_status(SocketStatus::Connected);
                info!(url = %config.url, "socket connected");

                while let Some(text) = inbound.recv().await {
                    shared.dispatch(&text);
                }

                shared
                    .outbound
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take();
                shared.set_status(SocketStatus::Disconnected);
                warn!(url = %config.url, "socket disconnected");
            }
            Err(e) => {
                shared.set_status(SocketStatus::Disconnected);
                warn!(url = %config.url, error = %e, "socket connect failed");
            }
        }

        if attempts >= config.max_attempts {
            shared.set_status(SocketStatus::GivenUp);
            warn!(attempts, "reconnect budget exhausted, waiting for manual reconnect");
            shared.wake.notified().await;
            attempts = 0;
            continue;
        }

        attempts += 1;
        info!(attempt = attempts, max = config.max_attempts, "scheduling reconnect");
        tokio::select! {
            () = tokio::time::sleep(config.retry_delay) => {}
            () = shared.wake.notified() => {
                attempts = 0;
            }
        }
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
