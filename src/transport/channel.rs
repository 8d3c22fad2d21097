use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::reconnect::ReconnectPolicy;
use super::wire::{self, InboundEvent};
use crate::config::{TransportConfig, TransportVariant};
use crate::error::{TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, never opened
    Idle,
    Connecting,
    Open,
    /// Event-tagged only: waiting to retry after a drop
    Reconnecting,
    /// Ended by `close()`, by the backend, or by a failure
    Closed,
    /// Event-tagged only: retries exhausted
    Disconnected,
}

impl ChannelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Disconnected)
    }
}

enum Command {
    Send(String),
    Request { seq: u64, text: String },
    Timeout { seq: u64 },
    Close,
}

enum Ending {
    ClosedByUser,
    /// Backend went away; `Some` carries the transport error text
    Remote(Option<String>),
}

enum Reconnect {
    Connected(Box<WsStream>),
    ClosedByUser,
    Exhausted(u32),
}

/// Outstanding request bookkeeping, owned by the connection task.
#[derive(Default)]
struct Pending {
    awaiting: Option<u64>,
    terminal_seen: bool,
}

/// Duplex JSON channel to the analysis backend.
///
/// All inbound frames are decoded and dispatched from a single connection
/// task, so handlers for one channel never run concurrently and see events
/// in arrival order. Synthetic events (`connect`, `disconnect`, timeout and
/// transport `error`) go through the same task.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    variant: TransportVariant,
    config: TransportConfig,
    dispatcher: Mutex<Dispatcher>,
    state: watch::Sender<ChannelState>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    request_seq: AtomicU64,
}

impl Channel {
    /// Create an unopened channel so handlers can be registered first
    pub fn new(url: impl Into<String>, variant: TransportVariant, config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                variant,
                config,
                dispatcher: Mutex::new(Dispatcher::new()),
                state,
                commands: Mutex::new(None),
                request_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Create and open a channel
    pub async fn connect(
        url: impl Into<String>,
        variant: TransportVariant,
        config: TransportConfig,
    ) -> TransportResult<Self> {
        let channel = Self::new(url, variant, config);
        channel.open().await?;
        Ok(channel)
    }

    /// Open the connection. A no-op while already connecting or open.
    ///
    /// The event-tagged variant retries the initial connect with the same
    /// bounded backoff it uses after a drop.
    pub async fn open(&self) -> TransportResult<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if matches!(
                state,
                ChannelState::Idle | ChannelState::Closed | ChannelState::Disconnected
            ) {
                *state = ChannelState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(url = %self.inner.url, "Channel already open or opening");
            return Ok(());
        }

        info!(url = %self.inner.url, variant = ?self.inner.variant, "Opening analysis channel");

        let connected = match self.inner.variant {
            TransportVariant::StageTagged => connect_async(self.inner.url.as_str())
                .await
                .map(|(ws, _)| ws)
                .map_err(|e| TransportError::Connect {
                    url: self.inner.url.clone(),
                    message: e.to_string(),
                }),
            TransportVariant::EventTagged => self.inner.connect_with_retries().await,
        };

        let ws = match connected {
            Ok(ws) => ws,
            Err(e) => {
                error!(url = %self.inner.url, error = %e, "Analysis channel failed to open");
                let end_state = match e {
                    TransportError::ReconnectExhausted { .. } => ChannelState::Disconnected,
                    _ => ChannelState::Closed,
                };
                self.inner.state.send_replace(end_state);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.commands) = Some(tx);
        self.inner.state.send_replace(ChannelState::Open);
        tokio::spawn(run_connection(Arc::clone(&self.inner), ws, rx));
        Ok(())
    }

    /// Register the handler for `event`, replacing any earlier one.
    ///
    /// Returns true if a handler was replaced.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        lock(&self.inner.dispatcher).on(event, handler)
    }

    /// Remove the handler for `event`
    pub fn off(&self, event: &str) -> bool {
        lock(&self.inner.dispatcher).off(event)
    }

    /// Send a JSON frame. Logged and dropped when the channel is not open.
    pub fn send(&self, payload: &Value) {
        if let Err(e) = self.enqueue(payload, Command::Send) {
            warn!(url = %self.inner.url, error = %e, "Frame not sent");
        }
    }

    /// Emit a named event (event-tagged framing)
    pub fn emit(&self, event: &str, payload: &Value) {
        self.send(&wire::event_frame(event, payload));
    }

    /// Send a frame and start the terminal-stage deadline.
    ///
    /// If no terminal event arrives within the configured timeout, handlers
    /// receive a synthetic `error`. A channel that closes first never fires.
    pub fn request(&self, payload: &Value) {
        let seq = self.inner.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match self.enqueue(payload, |text| Command::Request { seq, text }) {
            Ok(()) => self.arm_timeout(seq),
            Err(e) => warn!(url = %self.inner.url, error = %e, "Request not sent"),
        }
    }

    /// [`Channel::request`] with event-tagged framing
    pub fn request_event(&self, event: &str, payload: &Value) {
        self.request(&wire::event_frame(event, payload));
    }

    /// Close the connection. Safe to call any number of times.
    pub fn close(&self) {
        match lock(&self.inner.commands).take() {
            Some(tx) => {
                debug!(url = %self.inner.url, "Closing analysis channel");
                let _ = tx.send(Command::Close);
            }
            None => debug!(url = %self.inner.url, "Channel already closed"),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Wait until the channel reaches a terminal state.
    ///
    /// Returns immediately for a channel that was never opened.
    pub async fn closed(&self) -> ChannelState {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() || state == ChannelState::Idle {
                return state;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn variant(&self) -> TransportVariant {
        self.inner.variant
    }

    fn enqueue(
        &self,
        payload: &Value,
        make: impl FnOnce(String) -> Command,
    ) -> TransportResult<()> {
        if self.state() != ChannelState::Open {
            return Err(TransportError::NotOpen);
        }
        let text = serde_json::to_string(payload)?;
        let guard = lock(&self.inner.commands);
        let tx = guard.as_ref().ok_or(TransportError::NotOpen)?;
        tx.send(make(text)).map_err(|_| TransportError::NotOpen)
    }

    fn arm_timeout(&self, seq: u64) {
        let Some(tx) = lock(&self.inner.commands).clone() else {
            return;
        };
        let timeout = self.inner.config.analysis_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // Fails quietly once the connection task is gone
            let _ = tx.send(Command::Timeout { seq });
        });
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("url", &self.inner.url)
            .field("variant", &self.inner.variant)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn dispatch(&self, event: &InboundEvent) -> bool {
        let handler = lock(&self.dispatcher).take(&event.name);
        match handler {
            Some(mut handler) => {
                handler(event);
                lock(&self.dispatcher).restore(&event.name, handler);
                true
            }
            None => {
                debug!(event = %event.name, "No handler registered");
                false
            }
        }
    }

    fn handle_frame(&self, text: &str, pending: &mut Pending) {
        match wire::decode(self.variant, text) {
            Ok(event) => {
                if wire::is_terminal(self.variant, &event.name) {
                    pending.awaiting = None;
                    pending.terminal_seen = true;
                }
                debug!(event = %event.name, "Inbound event");
                self.dispatch(&event);
            }
            Err(e) => warn!(error = %e, "Dropping undecodable frame"),
        }
    }

    fn handle_timeout(&self, seq: u64, pending: &mut Pending) {
        if pending.awaiting != Some(seq) {
            debug!(seq, "Request deadline passed after a terminal event");
            return;
        }
        pending.awaiting = None;
        pending.terminal_seen = true;
        let err = TransportError::Timeout {
            timeout_ms: self.config.analysis_timeout_ms,
        };
        warn!(url = %self.url, error = %err, "No terminal stage before the deadline");
        self.dispatch(&InboundEvent::error(err.to_string()));
    }

    /// Dispatch `disconnect`, then publish the final state.
    fn finish(&self, state: ChannelState, reason: Value) {
        self.dispatch(&InboundEvent::new(wire::DISCONNECT, reason));
        lock(&self.commands).take();
        self.state.send_replace(state);
    }

    async fn connect_with_retries(&self) -> TransportResult<WsStream> {
        let policy = ReconnectPolicy::from(&self.config);
        let mut last_error = match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => return Ok(ws),
            Err(e) => e.to_string(),
        };
        for (attempt, delay) in (1..).zip(policy.schedule()) {
            warn!(
                url = %self.url,
                attempt,
                delay_ms = delay.as_millis(),
                error = %last_error,
                "Retrying channel connect"
            );
            tokio::time::sleep(delay).await;
            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => return Ok(ws),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(TransportError::ReconnectExhausted {
            attempts: policy.max_attempts,
        })
    }
}

async fn run_connection(
    inner: Arc<Inner>,
    mut ws: WsStream,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending = Pending::default();
    inner.dispatch(&InboundEvent::new(wire::CONNECT, Value::Null));

    loop {
        let ending = pump(&inner, &mut ws, &mut rx, &mut pending).await;
        let cause = match ending {
            Ending::ClosedByUser => {
                info!(url = %inner.url, "Analysis channel closed");
                inner.finish(ChannelState::Closed, json!({ "reason": "closed" }));
                return;
            }
            Ending::Remote(_) if pending.terminal_seen => {
                info!(url = %inner.url, "Backend closed the channel after a terminal stage");
                inner.finish(ChannelState::Closed, json!({ "reason": "remote_closed" }));
                return;
            }
            Ending::Remote(cause) => cause,
        };

        let message =
            cause.unwrap_or_else(|| "connection closed before a terminal stage".to_string());
        warn!(url = %inner.url, error = %message, "Analysis channel dropped");

        match inner.variant {
            TransportVariant::StageTagged => {
                let err = TransportError::Dropped { message };
                inner.dispatch(&InboundEvent::error(err.to_string()));
                inner.finish(ChannelState::Closed, json!({ "reason": "dropped" }));
                return;
            }
            TransportVariant::EventTagged => match reconnect(&inner, &mut rx, &mut pending).await {
                Reconnect::Connected(new_ws) => {
                    ws = *new_ws;
                    inner.state.send_replace(ChannelState::Open);
                    inner.dispatch(&InboundEvent::new(wire::CONNECT, Value::Null));
                }
                Reconnect::ClosedByUser => {
                    inner.finish(ChannelState::Closed, json!({ "reason": "closed" }));
                    return;
                }
                Reconnect::Exhausted(attempts) => {
                    let err = TransportError::ReconnectExhausted { attempts };
                    error!(url = %inner.url, error = %err, "Giving up on analysis channel");
                    if !pending.terminal_seen {
                        inner.dispatch(&InboundEvent::error(err.to_string()));
                    }
                    inner.finish(
                        ChannelState::Disconnected,
                        json!({ "reason": "reconnect_exhausted", "attempts": attempts }),
                    );
                    return;
                }
            },
        }
    }
}

async fn pump(
    inner: &Inner,
    ws: &mut WsStream,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Pending,
) -> Ending {
    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_frame(&text, pending),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Close frame received");
                    return Ending::Remote(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ending::Remote(Some(e.to_string())),
                None => return Ending::Remote(None),
            },
            command = rx.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        return Ending::Remote(Some(e.to_string()));
                    }
                }
                Some(Command::Request { seq, text }) => {
                    pending.awaiting = Some(seq);
                    pending.terminal_seen = false;
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        return Ending::Remote(Some(e.to_string()));
                    }
                }
                Some(Command::Timeout { seq }) => inner.handle_timeout(seq, pending),
                Some(Command::Close) | None => {
                    let _ = ws.send(Message::Close(None)).await;
                    return Ending::ClosedByUser;
                }
            },
        }
    }
}

async fn reconnect(
    inner: &Inner,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Pending,
) -> Reconnect {
    let policy = ReconnectPolicy::from(&inner.config);
    inner.state.send_replace(ChannelState::Reconnecting);

    for (attempt, delay) in (1..).zip(policy.schedule()) {
        warn!(
            url = %inner.url,
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting analysis channel"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = rx.recv() => match command {
                    Some(Command::Timeout { seq }) => inner.handle_timeout(seq, pending),
                    Some(Command::Send(_)) | Some(Command::Request { .. }) => {
                        warn!("Dropping outbound frame while reconnecting");
                    }
                    Some(Command::Close) | None => return Reconnect::ClosedByUser,
                },
            }
        }

        match connect_async(inner.url.as_str()).await {
            Ok((ws, _)) => {
                info!(url = %inner.url, attempt, "Analysis channel reconnected");
                return Reconnect::Connected(Box::new(ws));
            }
            Err(e) => warn!(url = %inner.url, attempt, error = %e, "Reconnect attempt failed"),
        }
    }

    Reconnect::Exhausted(policy.max_attempts)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
