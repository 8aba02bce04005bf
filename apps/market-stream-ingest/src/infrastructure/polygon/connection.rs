//! Channel Connection
//!
//! One long-lived WebSocket session per frequency, run as an actor task.
//!
//! The task is the sole owner of the socket and the heartbeat state. The
//! [`ChannelConnection`] handle talks to it over an mpsc command channel with
//! oneshot replies and observes lifecycle changes through a `watch` channel.
//!
//! The subscription set belongs to the handle and outlives session tasks:
//! whichever task goes live next re-sends all of it. Configured symbols seed
//! the set, so they are subscribed on the first live session even when that
//! session comes up long after `connect()` gave up waiting.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ─► Connecting ─► AuthPending ─┬─► Connected
//!      ▲                                      └─► ConnectedUnconfirmed (ack timeout)
//!      │                 ▲                              │
//!      │                 └──── Reconnecting ◄───────────┘ (error, silence, close)
//!      └──────────── attempts exhausted / disconnect()
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::auth::{AUTH_TIMEOUT, AuthError, AuthHandler, AuthProgress, Credentials};
use super::codec::{CodecError, JsonCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatSupervisor};
use super::messages::{ControlRequest, PolygonMessage, StatusKind, StatusMessage};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::domain::streaming::{ConnectionState, FrequencyKind, StatusEvent};
use crate::domain::subscription::{SubscriptionSet, Symbol};
use crate::infrastructure::metrics;

// =============================================================================
// Constants
// =============================================================================

/// Default wait for a connection to go live.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default wait for the session task to answer a command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const COMMAND_BUFFER: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a session ended. Never surfaced past the connection; they drive
/// reconnection and appear in status details.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Socket did not open in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Vendor rejected the credential.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Outbound request could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Peer stayed silent through a ping.
    #[error("heartbeat timeout after {0:?} of silence")]
    HeartbeatTimeout(Duration),

    /// Peer sent a close frame.
    #[error("connection closed by peer: {0}")]
    ClosedByPeer(String),

    /// Read half ended without a close frame.
    #[error("WebSocket stream ended")]
    StreamEnded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Everything one channel needs to connect.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Channel frequency.
    pub frequency: FrequencyKind,
    /// WebSocket endpoint.
    pub url: String,
    /// API key for this channel.
    pub credentials: Credentials,
    /// Backoff policy.
    pub reconnect: ReconnectConfig,
    /// Silence supervision.
    pub heartbeat: HeartbeatConfig,
    /// Wait for the auth acknowledgement before streaming unconfirmed.
    pub auth_timeout: Duration,
    /// Wait for `connect()` to observe a live session.
    pub connect_timeout: Duration,
    /// Wait for the session task to answer a command.
    pub command_timeout: Duration,
    /// Symbols subscribed whenever a session goes live, until unsubscribed.
    pub symbols: Vec<Symbol>,
}

impl ConnectionConfig {
    /// Config with default timings.
    #[must_use]
    pub fn new(frequency: FrequencyKind, url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            frequency,
            url: url.into(),
            credentials,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            auth_timeout: AUTH_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            command_timeout: COMMAND_TIMEOUT,
            symbols: Vec::new(),
        }
    }

    fn seed_subscriptions(&self) -> SubscriptionSet {
        let mut set = SubscriptionSet::new();
        let initial = set.pending_additions(&self.symbols);
        set.commit_additions(&initial);
        set
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Receives everything a channel produces.
///
/// Called from the channel task and awaited in arrival order, so a slow
/// observer slows only its own channel.
#[async_trait]
pub trait ChannelObserver: Send + Sync {
    /// A decoded data message (never `status` or unknown kinds).
    async fn on_message(&self, frequency: FrequencyKind, message: PolygonMessage);

    /// A lifecycle change.
    async fn on_status(&self, status: StatusEvent);
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of one channel.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionSnapshot {
    /// Channel frequency.
    pub frequency: FrequencyKind,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Whether the channel will keep reconnecting.
    pub should_reconnect: bool,
    /// Consecutive failed attempts since the last live session.
    pub reconnect_attempts: u32,
    /// Subscribed symbol count.
    pub subscriptions: usize,
    /// Data messages received since creation.
    pub messages_received: u64,
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    config: ConnectionConfig,
    codec: JsonCodec,
    observer: Arc<dyn ChannelObserver>,
    state_tx: watch::Sender<ConnectionState>,
    should_reconnect: AtomicBool,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    // Locked only between awaits; one session task runs at a time.
    subscriptions: Mutex<SubscriptionSet>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn may_continue(&self, cancel: &CancellationToken) -> bool {
        !cancel.is_cancelled() && self.should_reconnect.load(Ordering::SeqCst)
    }

    async fn transition(&self, state: ConnectionState, detail: Option<String>) {
        let previous = self.state_tx.send_replace(state);
        if previous == state && detail.is_none() {
            return;
        }

        let frequency = self.config.frequency;
        metrics::record_connection_state(frequency, state);
        tracing::info!(
            frequency = %frequency,
            from = %previous,
            to = %state,
            detail = detail.as_deref().unwrap_or(""),
            "Channel state changed"
        );

        self.observer
            .on_status(StatusEvent {
                frequency,
                state,
                detail,
            })
            .await;
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

struct Command {
    action: SubscriptionAction,
    symbols: Vec<Symbol>,
    reply: oneshot::Sender<bool>,
}

/// Answer a command that arrived while no session is live.
fn refuse(command: Command) {
    let _ = command.reply.send(false);
}

// =============================================================================
// Channel Task
// =============================================================================

async fn run_channel(
    shared: Arc<Shared>,
    mut commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let frequency = shared.config.frequency;
    let mut policy = ReconnectPolicy::new(shared.config.reconnect.clone());

    while shared.may_continue(&cancel) {
        shared.transition(ConnectionState::Connecting, None).await;

        let error = match run_session(&shared, &mut commands, &mut policy, &cancel).await {
            Ok(()) => break,
            Err(e) => e,
        };
        tracing::warn!(frequency = %frequency, error = %error, "Channel session ended");

        if !shared.may_continue(&cancel) {
            break;
        }

        let Some(delay) = policy.next_delay() else {
            shared.should_reconnect.store(false, Ordering::SeqCst);
            let exhausted = ReconnectError::MaxAttemptsExceeded(policy.max_attempts());
            tracing::error!(
                frequency = %frequency,
                error = %exhausted,
                "Channel stopped"
            );
            shared
                .transition(ConnectionState::Disconnected, Some(exhausted.to_string()))
                .await;
            return;
        };

        let attempt = policy.attempt_count();
        shared.reconnect_attempts.store(attempt, Ordering::SeqCst);
        metrics::record_reconnect(frequency);
        shared
            .transition(
                ConnectionState::Reconnecting,
                Some(format!(
                    "attempt {attempt} in {}ms after: {error}",
                    delay.as_millis()
                )),
            )
            .await;

        if !backoff(&mut commands, &cancel, delay).await {
            break;
        }
    }

    shared.transition(ConnectionState::Disconnected, None).await;
}

/// Sleep out a backoff delay. Returns `false` if cancelled.
async fn backoff(
    commands: &mut mpsc::Receiver<Command>,
    cancel: &CancellationToken,
    delay: Duration,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return false,
            () = &mut sleep => return true,
            Some(command) = commands.recv() => refuse(command),
        }
    }
}

/// One socket lifetime. `Ok` means cancelled; `Err` means reconnect.
async fn run_session(
    shared: &Arc<Shared>,
    commands: &mut mpsc::Receiver<Command>,
    policy: &mut ReconnectPolicy,
    cancel: &CancellationToken,
) -> Result<(), ConnectionError> {
    let config = &shared.config;
    tracing::info!(frequency = %config.frequency, url = %config.url, "Connecting channel");

    let (stream, _response) = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(config.url.as_str()),
    )
    .await
    .map_err(|_| ConnectionError::ConnectTimeout(config.connect_timeout))??;
    let (write, mut read) = stream.split();

    let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel(8);
    let heartbeat_cancel = cancel.child_token();
    let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();

    let mut session = Session {
        shared,
        write,
        auth: AuthHandler::new(config.credentials.clone()),
        heartbeat: Arc::new(HeartbeatState::new()),
        heartbeat_tx,
        heartbeat_cancel,
        policy,
        live: false,
    };
    session.authenticate().await?;

    let auth_deadline = tokio::time::sleep(config.auth_timeout);
    tokio::pin!(auth_deadline);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                session.close().await;
                return Ok(());
            }
            () = &mut auth_deadline, if !session.live => {
                session.on_auth_timeout().await?;
            }
            Some(event) = heartbeat_rx.recv() => session.on_heartbeat(event).await?,
            Some(command) = commands.recv() => session.on_command(command).await?,
            frame = read.next() => session.on_frame(frame).await?,
        }
    }
}

/// Per-socket state borrowed from the channel task.
struct Session<'a, W> {
    shared: &'a Shared,
    write: W,
    auth: AuthHandler,
    heartbeat: Arc<HeartbeatState>,
    heartbeat_tx: mpsc::Sender<HeartbeatEvent>,
    heartbeat_cancel: CancellationToken,
    policy: &'a mut ReconnectPolicy,
    live: bool,
}

impl<W> Session<'_, W>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    const fn frequency(&self) -> FrequencyKind {
        self.shared.config.frequency
    }

    async fn send(&mut self, request: &ControlRequest) -> Result<(), ConnectionError> {
        let text = self.shared.codec.encode(request)?;
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<(), ConnectionError> {
        self.auth.reset();
        let request = self.auth.begin();
        self.send(&request).await?;
        self.shared
            .transition(ConnectionState::AuthPending, None)
            .await;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }

    async fn on_auth_timeout(&mut self) -> Result<(), ConnectionError> {
        self.auth.on_timeout();
        tracing::warn!(
            frequency = %self.frequency(),
            timeout_ms = u64::try_from(self.shared.config.auth_timeout.as_millis()).unwrap_or(u64::MAX),
            "No auth acknowledgement; streaming unconfirmed"
        );
        self.go_live(ConnectionState::ConnectedUnconfirmed).await
    }

    async fn go_live(&mut self, state: ConnectionState) -> Result<(), ConnectionError> {
        if self.live {
            self.shared.transition(state, None).await;
            return Ok(());
        }

        self.live = true;
        self.policy.reset();
        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.heartbeat.reset();
        tokio::spawn(
            HeartbeatSupervisor::new(
                self.shared.config.heartbeat.clone(),
                Arc::clone(&self.heartbeat),
                self.heartbeat_tx.clone(),
                self.heartbeat_cancel.clone(),
            )
            .run(),
        );
        self.shared.transition(state, None).await;
        self.restore_subscriptions().await
    }

    async fn restore_subscriptions(&mut self) -> Result<(), ConnectionError> {
        let symbols = self.shared.subscriptions.lock().symbols();
        metrics::set_subscriptions(self.frequency(), symbols.len());
        if symbols.is_empty() {
            return Ok(());
        }
        tracing::info!(
            frequency = %self.frequency(),
            count = symbols.len(),
            "Restoring subscriptions"
        );
        let request = ControlRequest::subscribe(self.frequency(), &symbols);
        self.send(&request).await
    }

    async fn on_heartbeat(&mut self, event: HeartbeatEvent) -> Result<(), ConnectionError> {
        match event {
            HeartbeatEvent::SendPing => {
                self.write.send(Message::Ping(Vec::<u8>::new().into())).await?;
                self.heartbeat.mark_ping_sent();
                Ok(())
            }
            HeartbeatEvent::Timeout { silent_for } => {
                Err(ConnectionError::HeartbeatTimeout(silent_for))
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<(), ConnectionError> {
        let outcome = self.apply(command.action, &command.symbols).await;
        let _ = command.reply.send(matches!(outcome, Ok(true)));
        outcome.map(|_| ())
    }

    async fn apply(
        &mut self,
        action: SubscriptionAction,
        symbols: &[Symbol],
    ) -> Result<bool, ConnectionError> {
        if !self.live {
            return Ok(false);
        }

        let frequency = self.frequency();
        let pending = {
            let subscriptions = self.shared.subscriptions.lock();
            match action {
                SubscriptionAction::Subscribe => subscriptions.pending_additions(symbols),
                SubscriptionAction::Unsubscribe => subscriptions.pending_removals(symbols),
            }
        };
        if pending.is_empty() {
            return Ok(true);
        }

        let request = match action {
            SubscriptionAction::Subscribe => ControlRequest::subscribe(frequency, &pending),
            SubscriptionAction::Unsubscribe => ControlRequest::unsubscribe(frequency, &pending),
        };
        self.send(&request).await?;
        let total = {
            let mut subscriptions = self.shared.subscriptions.lock();
            match action {
                SubscriptionAction::Subscribe => subscriptions.commit_additions(&pending),
                SubscriptionAction::Unsubscribe => subscriptions.commit_removals(&pending),
            }
            subscriptions.len()
        };
        metrics::set_subscriptions(frequency, total);
        tracing::debug!(
            frequency = %frequency,
            params = %request.params,
            total,
            "Subscription change sent"
        );
        Ok(true)
    }

    async fn on_frame(
        &mut self,
        frame: Option<Result<Message, tungstenite::Error>>,
    ) -> Result<(), ConnectionError> {
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ConnectionError::StreamEnded),
        };
        self.heartbeat.record_activity();

        match frame {
            Message::Text(text) => self.on_text(text.as_str()).await,
            Message::Ping(data) => {
                self.write.send(Message::Pong(data)).await?;
                Ok(())
            }
            Message::Close(close) => Err(ConnectionError::ClosedByPeer(
                close.map_or_else(String::new, |c| c.reason.as_str().to_string()),
            )),
            Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => Ok(()),
        }
    }

    async fn on_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        let frequency = self.frequency();
        let messages = match self.shared.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(frequency = %frequency, error = %e, "Dropping undecodable frame");
                metrics::record_parse_error(frequency);
                return Ok(());
            }
        };

        for message in messages {
            match message {
                PolygonMessage::Status(status) => self.on_status(&status).await?,
                PolygonMessage::Unknown => {
                    tracing::trace!(frequency = %frequency, "Ignoring unknown event type");
                }
                data => {
                    self.shared.messages_received.fetch_add(1, Ordering::Relaxed);
                    metrics::record_message_received(frequency, data.event_code());
                    self.shared.observer.on_message(frequency, data).await;
                }
            }
        }
        Ok(())
    }

    async fn on_status(&mut self, status: &StatusMessage) -> Result<(), ConnectionError> {
        match self.auth.on_status(status)? {
            AuthProgress::Authenticated => {
                tracing::info!(frequency = %self.frequency(), "Channel authenticated");
                self.go_live(ConnectionState::Connected).await
            }
            AuthProgress::Unchanged => {
                if status.kind() == StatusKind::Other {
                    tracing::warn!(
                        frequency = %self.frequency(),
                        status = %status.status,
                        message = %status.message,
                        "Vendor status"
                    );
                } else {
                    tracing::debug!(
                        frequency = %self.frequency(),
                        status = %status.status,
                        message = %status.message,
                        "Vendor status"
                    );
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

struct SessionHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn shutdown(self) {
        self.cancel.cancel();
        let mut task = self.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

/// Handle to one frequency's connection.
///
/// At most one session task runs per handle.
pub struct ChannelConnection {
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<SessionHandle>>,
}

impl ChannelConnection {
    /// Create a disconnected channel.
    #[must_use]
    pub fn new(config: ConnectionConfig, observer: Arc<dyn ChannelObserver>) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let codec = JsonCodec::new(config.frequency);
        let subscriptions = Mutex::new(config.seed_subscriptions());
        Self {
            shared: Arc::new(Shared {
                config,
                codec,
                observer,
                state_tx,
                should_reconnect: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                messages_received: AtomicU64::new(0),
                subscriptions,
            }),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Channel frequency.
    #[must_use]
    pub fn frequency(&self) -> FrequencyKind {
        self.shared.config.frequency
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribe to lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Whether the channel is streaming.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_live()
    }

    /// Whether the channel will keep reconnecting.
    #[must_use]
    pub fn should_reconnect(&self) -> bool {
        self.shared.should_reconnect.load(Ordering::SeqCst)
    }

    /// Consecutive failed attempts since the last live session.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Data messages received since creation.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.shared.messages_received.load(Ordering::Relaxed)
    }

    /// Point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            frequency: self.frequency(),
            state: self.state(),
            should_reconnect: self.should_reconnect(),
            reconnect_attempts: self.reconnect_attempts(),
            subscriptions: self.shared.subscriptions.lock().len(),
            messages_received: self.messages_received(),
        }
    }

    /// Connect, returning once the channel is live.
    ///
    /// Returns `true` immediately when already live. Otherwise any stale
    /// session is torn down and a fresh session task started; the new task
    /// restores the current subscriptions once it goes live. Returns `false`
    /// if the channel is not live within the connect timeout; the task keeps
    /// retrying in the background unless its attempts run out.
    pub async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let mut state_rx = {
            let mut session = self.session.lock().await;
            if self.is_connected() {
                return true;
            }
            if let Some(stale) = session.take() {
                stale.shutdown().await;
            }

            self.shared.should_reconnect.store(true, Ordering::SeqCst);
            self.shared.reconnect_attempts.store(0, Ordering::SeqCst);

            let state_rx = self.shared.state_tx.subscribe();
            let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_channel(
                Arc::clone(&self.shared),
                commands_rx,
                cancel.clone(),
            ));
            *session = Some(SessionHandle {
                commands: commands_tx,
                cancel,
                task,
            });
            state_rx
        };

        let frequency = self.frequency();
        let timeout = self.shared.config.connect_timeout;
        let shared = &self.shared;
        let settled = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|state| {
                state.is_live() || !shared.should_reconnect.load(Ordering::SeqCst)
            }),
        )
        .await;

        match settled {
            Ok(Ok(state)) if state.is_live() => true,
            Ok(_) => {
                tracing::warn!(frequency = %frequency, "Channel stopped before going live");
                false
            }
            Err(_) => {
                tracing::warn!(
                    frequency = %frequency,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Channel not live within connect timeout; retrying in background"
                );
                false
            }
        }
    }

    /// Stop the session and forget runtime subscriptions. Configured symbols
    /// are kept for the next `connect()`. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.should_reconnect.store(false, Ordering::SeqCst);
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
        *self.shared.subscriptions.lock() = self.shared.config.seed_subscriptions();

        if self.state() != ConnectionState::Disconnected {
            self.shared
                .transition(
                    ConnectionState::Disconnected,
                    Some("disconnect requested".to_string()),
                )
                .await;
        }
    }

    /// Subscribe to symbols on this channel.
    ///
    /// Empty input succeeds without I/O. Already-subscribed symbols are
    /// skipped; if nothing is left no message is sent. Returns `false` when
    /// not live or when the send fails.
    pub async fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        self.change(SubscriptionAction::Subscribe, symbols).await
    }

    /// Unsubscribe from symbols on this channel. Mirrors [`Self::subscribe`].
    pub async fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        self.change(SubscriptionAction::Unsubscribe, symbols).await
    }

    /// Subscribed symbols, sorted. Includes symbols waiting to be restored
    /// while the channel is down.
    #[must_use]
    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.shared.subscriptions.lock().symbols()
    }

    async fn change<S: AsRef<str>>(&self, action: SubscriptionAction, symbols: &[S]) -> bool {
        if symbols.is_empty() {
            return true;
        }
        if !self.is_connected() {
            return false;
        }
        let Some(commands) = self.command_sender().await else {
            return false;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command {
            action,
            symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
            reply: reply_tx,
        };
        if commands.send(command).await.is_err() {
            return false;
        }
        matches!(
            tokio::time::timeout(self.shared.config.command_timeout, reply_rx).await,
            Ok(Ok(true))
        )
    }

    async fn command_sender(&self) -> Option<mpsc::Sender<Command>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.commands.clone())
    }
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("frequency", &self.frequency())
            .field("state", &self.state())
            .field("url", &self.shared.config.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullObserver;

    #[async_trait]
    impl ChannelObserver for NullObserver {
        async fn on_message(&self, _frequency: FrequencyKind, _message: PolygonMessage) {}
        async fn on_status(&self, _status: StatusEvent) {}
    }

    fn connection(url: &str) -> ChannelConnection {
        let mut config = ConnectionConfig::new(
            FrequencyKind::PerSecond,
            url,
            Credentials::new("test-key").unwrap(),
        );
        config.connect_timeout = Duration::from_millis(300);
        config.reconnect = ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 2,
        };
        ChannelConnection::new(config, Arc::new(NullObserver))
    }

    #[test]
    fn new_connection_is_idle() {
        let conn = connection("ws://127.0.0.1:1");
        let snapshot = conn.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(!snapshot.should_reconnect);
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert_eq!(snapshot.subscriptions, 0);
    }

    #[tokio::test]
    async fn subscribe_requires_live_session() {
        let conn = connection("ws://127.0.0.1:1");
        assert!(!conn.subscribe(&["AAPL"]).await);
        assert!(!conn.unsubscribe(&["AAPL"]).await);
    }

    #[tokio::test]
    async fn empty_requests_succeed_without_session() {
        let conn = connection("ws://127.0.0.1:1");
        let none: [&str; 0] = [];
        assert!(conn.subscribe(&none).await);
        assert!(conn.unsubscribe(&none).await);
    }

    #[tokio::test]
    async fn configured_symbols_seed_the_set_and_survive_disconnect() {
        let mut config = ConnectionConfig::new(
            FrequencyKind::PerMinute,
            "ws://127.0.0.1:1",
            Credentials::new("test-key").unwrap(),
        );
        config.symbols = vec!["msft".to_string(), " aapl ".to_string(), "MSFT".to_string()];
        let conn = ChannelConnection::new(config, Arc::new(NullObserver));

        assert_eq!(conn.subscribed_symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(conn.snapshot().subscriptions, 2);

        conn.disconnect().await;
        assert_eq!(conn.subscribed_symbols(), vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let conn = connection("ws://127.0.0.1:1");
        conn.disconnect().await;
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.subscribed_symbols().is_empty());
    }

    #[tokio::test]
    async fn exhausted_attempts_stop_the_channel() {
        // Port 1 refuses connections, so every attempt fails fast.
        let conn = connection("ws://127.0.0.1:1");
        assert!(!conn.connect().await);

        let mut state_rx = conn.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!conn.should_reconnect());
        assert_eq!(conn.reconnect_attempts(), 2);
    }
}
