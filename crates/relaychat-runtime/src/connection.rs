//! WebSocket Connection Manager
//!
//! Owns the single relay socket. Every connect attempt runs in its own task
//! and reports back over an event channel tagged with an attempt generation,
//! so events from a superseded socket are ignored. Writes go through an
//! unbounded queue to a writer task, which keeps [`ConnectionManager::send`]
//! synchronous.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relaychat_core::{
    connection::{CLOSE_ABNORMAL, CLOSE_NO_STATUS},
    AppEvent, CloseAction, ConnectionConfig, ConnectionPhase, ConnectionState, Frame,
    MissedPongPolicy, Outbound, Result,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message as WsMessage,
};
use tracing::{debug, info, warn};
use url::Url;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// What a socket task reports back to the manager
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake done; frames are written through this queue
    Opened(mpsc::UnboundedSender<WsMessage>),
    /// One inbound text message
    Text(String),
    /// The socket closed or the stream ended
    Closed { code: u16, reason: String },
    /// The connect attempt failed or timed out
    Failed { reason: String },
}

/// Transport changes the client loop must react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The socket is open
    Connected,
    /// Inbound text to dispatch
    Text(String),
    /// The socket went away
    Lost,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Connect, send, close, reconnect with backoff, heartbeat
pub struct ConnectionManager {
    config: ConnectionConfig,
    endpoint: Url,
    state: ConnectionState,
    writer: Option<mpsc::UnboundedSender<WsMessage>>,
    generation: u64,
    event_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    event_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    socket_task: Option<JoinHandle<()>>,
    reconnect_at: Option<Instant>,
    next_heartbeat: Option<Instant>,
    /// App events waiting to be forwarded to the presentation layer
    notifications: Vec<AppEvent>,
}

impl ConnectionManager {
    /// Create a manager for `config.url`, authenticated with `token`
    pub fn new(config: ConnectionConfig, token: &str) -> Result<Self> {
        let endpoint = config.endpoint_with_token(token)?;
        let state = ConnectionState::new(&config);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            endpoint,
            state,
            writer: None,
            generation: 0,
            event_tx,
            event_rx,
            socket_task: None,
            reconnect_at: None,
            next_heartbeat: None,
            notifications: Vec::new(),
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open() && self.writer.is_some()
    }

    /// Start a connect attempt in the background
    ///
    /// Success arrives as [`LinkEvent::Connected`]; failure falls into the
    /// reconnect path without surfacing an error.
    pub fn connect(&mut self) {
        self.drop_socket();
        self.state.on_connecting();

        let generation = self.generation;
        let endpoint = self.endpoint.to_string();
        let connect_timeout = self.config.connect_timeout();
        let events = self.event_tx.clone();

        debug!(generation, "Connecting to relay");
        self.socket_task = Some(tokio::spawn(async move {
            run_socket(generation, endpoint, connect_timeout, events).await;
        }));
    }

    /// Serialize and write one frame. Returns false when the socket is not open.
    ///
    /// A send on a closed socket surfaces `Disconnected` and schedules a
    /// reconnect unless the user closed the connection.
    pub fn send(&mut self, frame: &Frame) -> bool {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = frame.kind(), error = %e, "Refusing to send frame");
                return false;
            }
        };

        if self.state.is_open() {
            if let Some(writer) = &self.writer {
                if writer.send(WsMessage::Text(text)).is_ok() {
                    return true;
                }
            }
        }

        warn!(kind = frame.kind(), "Send on closed socket");
        let will_reconnect = !self.state.closed_by_user();
        self.notify(AppEvent::Disconnected { will_reconnect });
        // an attempt already in flight reports its own outcome
        if will_reconnect && self.state.phase() != ConnectionPhase::Connecting {
            self.schedule_reconnect();
        }
        false
    }

    /// Close the socket on purpose and cancel every timer
    pub fn close(&mut self, code: u16, reason: &str) {
        info!(code, reason, "Closing connection");
        self.state.on_user_close();
        self.reconnect_at = None;
        self.next_heartbeat = None;

        if let Some(writer) = self.writer.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            let _ = writer.send(WsMessage::Close(Some(frame)));
        }
        self.drop_socket();
        self.notify(AppEvent::Disconnected {
            will_reconnect: false,
        });
    }

    // --- Event Loop Hooks ---

    /// Next report from a socket task
    pub async fn next_transport_event(&mut self) -> Option<(u64, TransportEvent)> {
        self.event_rx.recv().await
    }

    /// Apply a socket task report
    pub fn handle_transport_event(
        &mut self,
        generation: u64,
        event: TransportEvent,
    ) -> Option<LinkEvent> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Ignoring stale socket event");
            return None;
        }

        match event {
            TransportEvent::Opened(writer) => {
                if self.state.closed_by_user() {
                    return None;
                }
                let now = Instant::now();
                self.writer = Some(writer);
                self.state.on_open(now.into_std());
                self.reconnect_at = None;
                self.next_heartbeat = Some(now + self.config.heartbeat_interval());
                info!(url = %self.config.url, "Connected to relay");
                self.notify(AppEvent::Connected);
                Some(LinkEvent::Connected)
            }
            TransportEvent::Text(text) => Some(LinkEvent::Text(text)),
            TransportEvent::Closed { code, reason } => {
                info!(code, reason = %reason, "Connection closed");
                self.on_lost(code, true);
                Some(LinkEvent::Lost)
            }
            TransportEvent::Failed { reason } => {
                warn!(reason = %reason, "Connect attempt failed");
                self.on_lost(CLOSE_ABNORMAL, false);
                None
            }
        }
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn heartbeat_deadline(&self) -> Option<Instant> {
        self.next_heartbeat
    }

    pub fn pong_deadline(&self) -> Option<Instant> {
        self.state.pong_deadline().map(Instant::from_std)
    }

    /// The reconnect timer fired
    pub fn fire_reconnect(&mut self) {
        self.reconnect_at = None;
        self.state.on_reconnect_timer();
        info!(attempt = self.state.reconnect_attempts(), "Reconnecting");
        self.connect();
    }

    /// The heartbeat timer fired
    pub fn heartbeat_tick(&mut self) {
        let now = Instant::now();
        self.next_heartbeat = Some(now + self.config.heartbeat_interval());
        if self.state.on_heartbeat_tick(now.into_std()) {
            self.send(&Frame::Ping);
        }
    }

    /// The relay sent ping or pong
    pub fn record_liveness(&mut self) {
        self.state.on_liveness(Instant::now().into_std());
    }

    /// The pong deadline passed
    pub fn pong_timed_out(&mut self) -> Option<LinkEvent> {
        match self.state.on_pong_timeout() {
            MissedPongPolicy::Warn => None,
            MissedPongPolicy::Reconnect => {
                warn!("Dropping connection after missed pong");
                self.drop_socket();
                self.on_lost(CLOSE_ABNORMAL, true);
                Some(LinkEvent::Lost)
            }
        }
    }

    /// Queue an event for the presentation layer
    pub fn notify(&mut self, event: AppEvent) {
        self.notifications.push(event);
    }

    pub fn drain_notifications(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.notifications)
    }

    // --- Internals ---

    fn on_lost(&mut self, code: u16, was_open: bool) {
        self.writer = None;
        self.next_heartbeat = None;
        match self.state.on_close(code) {
            CloseAction::Reconnect => {
                if was_open {
                    self.notify(AppEvent::Disconnected {
                        will_reconnect: true,
                    });
                }
                self.schedule_reconnect();
            }
            CloseAction::Stop => {
                if was_open {
                    self.notify(AppEvent::Disconnected {
                        will_reconnect: false,
                    });
                }
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(scheduled) = self.state.schedule_reconnect() {
            self.reconnect_at = Some(Instant::now() + scheduled.delay);
            info!(
                attempt = scheduled.attempt,
                delay_ms = scheduled.delay.as_millis() as u64,
                "Reconnect scheduled"
            );
            self.notify(AppEvent::Reconnecting {
                attempt: scheduled.attempt,
                delay: scheduled.delay,
            });
        }
    }

    /// Forget the current socket; its late events become stale
    fn drop_socket(&mut self) {
        self.generation += 1;
        self.writer = None;
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound Adapter
// ----------------------------------------------------------------------------

/// [`Outbound`] over the connection manager: frames go to the socket, events
/// join the notification queue in order
pub struct LinkedOutbound<'a> {
    conn: &'a mut ConnectionManager,
}

impl<'a> LinkedOutbound<'a> {
    pub fn new(conn: &'a mut ConnectionManager) -> Self {
        Self { conn }
    }
}

impl Outbound for LinkedOutbound<'_> {
    fn send_frame(&mut self, frame: Frame) -> bool {
        self.conn.send(&frame)
    }

    fn emit(&mut self, event: AppEvent) {
        self.conn.notify(event);
    }
}

// ----------------------------------------------------------------------------
// Socket Task
// ----------------------------------------------------------------------------

async fn run_socket(
    generation: u64,
    endpoint: String,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
) {
    let stream = match tokio::time::timeout(connect_timeout, connect_async(endpoint)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let _ = events.send((generation, TransportEvent::Failed { reason: e.to_string() }));
            return;
        }
        Err(_) => {
            let _ = events.send((
                generation,
                TransportEvent::Failed {
                    reason: format!("handshake timed out after {:?}", connect_timeout),
                },
            ));
            return;
        }
    };

    let (mut sink, mut source) = stream.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WsMessage>();
    if events
        .send((generation, TransportEvent::Opened(writer_tx)))
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = writer_rx.recv().await {
            let closing = matches!(message, WsMessage::Close(_));
            if let Err(e) = sink.send(message).await {
                debug!(error = %e, "Socket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let (code, reason) = loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                if events.send((generation, TransportEvent::Text(text))).is_err() {
                    break (CLOSE_ABNORMAL, "manager gone".to_string());
                }
            }
            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => {
                    let _ = events.send((generation, TransportEvent::Text(text)));
                }
                Err(_) => debug!("Ignoring non-UTF-8 binary message"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                break frame
                    .map(|f| (u16::from(f.code), f.reason.into_owned()))
                    .unwrap_or((CLOSE_NO_STATUS, String::new()));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break (CLOSE_ABNORMAL, e.to_string()),
            None => break (CLOSE_ABNORMAL, "stream ended".to_string()),
        }
    };

    writer.abort();
    let _ = events.send((generation, TransportEvent::Closed { code, reason }));
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
