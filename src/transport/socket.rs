use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::events::{ClientEvent, EventKind, ServerEvent, TypingPayload};
use crate::api::models::{BulkMessage, Conversation, ConversationPatch, Message};
use crate::app::ReconnectPolicy;
use crate::error::{ApiError, ApiResult};
use crate::transport::codec::{self, EnginePacket, SocketPacket};
use crate::transport::listeners::{Listeners, Subscription};
use crate::utils::{self, lock};

/// Used until the server's handshake says otherwise.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One real-time connection to the backend. Created disconnected so callers
/// can attach listeners before calling [`SocketClient::connect`].
pub struct SocketClient {
    endpoint: Url,
    token: Option<String>,
    policy: ReconnectPolicy,
    listeners: Listeners,
    state: Arc<watch::Sender<ConnectionState>>,
    rooms: Arc<Mutex<BTreeSet<String>>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    running: Mutex<Option<Running>>,
}

impl SocketClient {
    pub fn new(base_url: &str, token: Option<String>, policy: ReconnectPolicy) -> ApiResult<Self> {
        let endpoint = utils::socket_endpoint(base_url)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            endpoint,
            token,
            policy,
            listeners: Listeners::new(),
            state: Arc::new(state),
            rooms: Arc::new(Mutex::new(BTreeSet::new())),
            outgoing: Mutex::new(None),
            running: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        lock(&self.rooms).iter().cloned().collect()
    }

    /// Starts the connection task. A no-op while already running.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        *lock(&self.outgoing) = Some(outgoing_tx);
        let cancel = CancellationToken::new();
        let ctx = SessionCtx {
            endpoint: self.endpoint.clone(),
            auth: self.auth_payload(),
            listeners: self.listeners.clone(),
            state: self.state.clone(),
            rooms: self.rooms.clone(),
            cancel: cancel.clone(),
        };
        let policy = self.policy.clone();
        let handle = tokio::spawn(run(ctx, policy, outgoing_rx));
        *running = Some(Running { cancel, handle });
    }

    pub fn disconnect(&self) {
        if let Some(running) = lock(&self.running).take() {
            running.cancel.cancel();
            log::info!("socket disconnect requested");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn auth_payload(&self) -> Value {
        match &self.token {
            Some(t) => json!({ "token": t }),
            None => json!({}),
        }
    }

    /// Sends an event if connected; otherwise logs and drops it.
    pub fn emit(&self, event: ClientEvent) -> bool {
        if self.state() != ConnectionState::Connected {
            log::warn!("dropping {} while disconnected", event.name());
            return false;
        }
        match lock(&self.outgoing).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Joined rooms are re-joined automatically after a reconnect.
    pub fn join_conversation(&self, conversation_id: &str) -> bool {
        lock(&self.rooms).insert(conversation_id.to_string());
        self.emit(ClientEvent::JoinConversation(conversation_id.to_string()))
    }

    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        lock(&self.rooms).remove(conversation_id);
        self.emit(ClientEvent::LeaveConversation(conversation_id.to_string()))
    }

    pub fn start_typing(&self, conversation_id: &str) -> bool {
        self.emit(ClientEvent::TypingStart(conversation_id.to_string()))
    }

    pub fn stop_typing(&self, conversation_id: &str) -> bool {
        self.emit(ClientEvent::TypingStop(conversation_id.to_string()))
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(kind, callback)
    }

    pub fn on_new_message<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::NewMessage, move |ev| {
            if let ServerEvent::NewMessage(m) = ev {
                f(m)
            }
        })
    }

    pub fn on_new_conversation<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Conversation) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::NewConversation, move |ev| {
            if let ServerEvent::NewConversation(c) = ev {
                f(c)
            }
        })
    }

    pub fn on_conversation_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ConversationPatch) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::ConversationUpdated, move |ev| {
            if let ServerEvent::ConversationUpdated(p) = ev {
                f(p)
            }
        })
    }

    pub fn on_bulk_message_created<F>(&self, f: F) -> Subscription
    where
        F: Fn(&BulkMessage) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::BulkMessageCreated, move |ev| {
            if let ServerEvent::BulkMessageCreated(b) = ev {
                f(b)
            }
        })
    }

    pub fn on_bulk_message_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&BulkMessage) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::BulkMessageUpdated, move |ev| {
            if let ServerEvent::BulkMessageUpdated(b) = ev {
                f(b)
            }
        })
    }

    pub fn on_typing_start<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TypingPayload) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::TypingStart, move |ev| {
            if let ServerEvent::TypingStart(t) = ev {
                f(t)
            }
        })
    }

    pub fn on_typing_stop<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TypingPayload) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::TypingStop, move |ev| {
            if let ServerEvent::TypingStop(t) = ev {
                f(t)
            }
        })
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            running.cancel.cancel();
        }
    }
}

struct SessionCtx {
    endpoint: Url,
    auth: Value,
    listeners: Listeners,
    state: Arc<watch::Sender<ConnectionState>>,
    rooms: Arc<Mutex<BTreeSet<String>>>,
    cancel: CancellationToken,
}

enum SessionEnd {
    Cancelled,
    Closed,
}

async fn run(
    ctx: SessionCtx,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
) {
    // After cancellation the state belongs to `disconnect()` and to any newer session.
    let mut attempt: u32 = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return;
        }
        ctx.state.send_replace(ConnectionState::Connecting);
        match session(&ctx, &mut outgoing, &mut attempt).await {
            Ok(SessionEnd::Cancelled) => return,
            Ok(SessionEnd::Closed) => log::warn!("socket closed by server"),
            Err(e) => log::error!("socket error: {}", e),
        }
        if ctx.cancel.is_cancelled() {
            return;
        }
        ctx.state.send_replace(ConnectionState::Disconnected);

        attempt += 1;
        if !policy.allows(attempt) {
            log::warn!("giving up after {} reconnection attempts", attempt - 1);
            break;
        }
        let delay = policy.delay(attempt);
        log::info!("reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn session(
    ctx: &SessionCtx,
    outgoing: &mut mpsc::UnboundedReceiver<ClientEvent>,
    attempt: &mut u32,
) -> ApiResult<SessionEnd> {
    let (ws, _) = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        res = connect_async(ctx.endpoint.as_str()) => res.map_err(|e| ApiError::Transport(e.to_string()))?,
    };
    log::debug!("websocket open: {}", ctx.endpoint);
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = DEFAULT_HEARTBEAT;
    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let bye = codec::encode(&EnginePacket::Message(SocketPacket::Disconnect));
                let _ = sink.send(WsMessage::Text(bye)).await;
                let _ = sink.close().await;
                return Ok(SessionEnd::Cancelled);
            }
            _ = sleep_until(deadline) => {
                return Err(ApiError::Transport("heartbeat timed out".into()));
            }
            Some(event) = outgoing.recv() => {
                // Anything queued from a previous session is stale.
                if *ctx.state.borrow() != ConnectionState::Connected {
                    log::debug!("discarding stale {}", event.name());
                    continue;
                }
                send_event(&mut sink, &event).await?;
            }
            frame = stream.next() => {
                let text = match frame {
                    None | Some(Ok(WsMessage::Close(_))) => return Ok(SessionEnd::Closed),
                    Some(Err(e)) => return Err(ApiError::Transport(e.to_string())),
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Ping(data))) => {
                        sink.send(WsMessage::Pong(data)).await.map_err(transport_err)?;
                        continue;
                    }
                    Some(Ok(_)) => continue,
                };
                deadline = Instant::now() + heartbeat;

                let packet = match codec::decode(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        log::warn!("{}", e);
                        continue;
                    }
                };
                match packet {
                    EnginePacket::Open(info) => {
                        if info.ping_interval > 0 {
                            heartbeat = Duration::from_millis(info.ping_interval + info.ping_timeout);
                            deadline = Instant::now() + heartbeat;
                        }
                        let connect = EnginePacket::Message(SocketPacket::Connect(Some(ctx.auth.clone())));
                        sink.send(WsMessage::Text(codec::encode(&connect))).await.map_err(transport_err)?;
                    }
                    EnginePacket::Ping => {
                        sink.send(WsMessage::Text(codec::encode(&EnginePacket::Pong))).await.map_err(transport_err)?;
                    }
                    EnginePacket::Close => return Ok(SessionEnd::Closed),
                    EnginePacket::Pong | EnginePacket::Noop => {}
                    EnginePacket::Message(SocketPacket::Connect(_)) => {
                        if ctx.cancel.is_cancelled() {
                            continue;
                        }
                        log::info!("socket connected");
                        *attempt = 0;
                        ctx.state.send_replace(ConnectionState::Connected);
                        let rooms: Vec<String> = lock(&ctx.rooms).iter().cloned().collect();
                        for room in rooms {
                            send_event(&mut sink, &ClientEvent::JoinConversation(room)).await?;
                        }
                    }
                    EnginePacket::Message(SocketPacket::ConnectError(reason)) => {
                        return Err(ApiError::Transport(format!("connect refused: {}", reason)));
                    }
                    EnginePacket::Message(SocketPacket::Disconnect) => return Ok(SessionEnd::Closed),
                    EnginePacket::Message(SocketPacket::Event { name, data }) => {
                        match ServerEvent::decode(&name, data) {
                            Ok(Some(event)) => {
                                ctx.listeners.dispatch(&event);
                            }
                            Ok(None) => log::debug!("ignoring event {}", name),
                            Err(e) => log::warn!("bad payload for {}: {}", name, e),
                        }
                    }
                }
            }
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> ApiResult<()>
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let packet = EnginePacket::Message(SocketPacket::Event {
        name: event.name().to_string(),
        data: event.payload(),
    });
    sink.send(WsMessage::Text(codec::encode(&packet))).await.map_err(transport_err)
}

fn transport_err(e: tokio_tungstenite::tungstenite::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

/// Owns the session's socket. Replaces a module-level singleton: views get
/// the client from here and re-initializing with the same token is a no-op.
pub struct Transport {
    base_url: String,
    policy: ReconnectPolicy,
    current: Mutex<Option<Arc<SocketClient>>>,
}

impl Transport {
    pub fn new(base_url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            base_url: base_url.into(),
            policy,
            current: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &crate::app::Settings) -> Self {
        Self::new(settings.socket_base(), settings.reconnect.clone())
    }

    /// Returns the existing client when the token matches; otherwise tears
    /// the old one down and creates a fresh, disconnected client.
    pub fn initialize(&self, token: Option<&str>) -> ApiResult<Arc<SocketClient>> {
        let mut current = lock(&self.current);
        if let Some(existing) = current.as_ref() {
            if existing.token() == token {
                return Ok(existing.clone());
            }
            log::info!("token changed; replacing socket");
            existing.disconnect();
        }
        let client = Arc::new(SocketClient::new(
            &self.base_url,
            token.map(str::to_string),
            self.policy.clone(),
        )?);
        *current = Some(client.clone());
        Ok(client)
    }

    pub fn current(&self) -> Option<Arc<SocketClient>> {
        lock(&self.current).clone()
    }

    pub fn shutdown(&self) {
        if let Some(client) = lock(&self.current).take() {
            client.disconnect();
        }
    }
}
