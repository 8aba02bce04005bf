//! Heartbeat Supervisor
//!
//! Watches a live session for inbound silence. Any inbound frame counts as
//! activity. Once the silence comes within one check interval of the
//! threshold the supervisor asks the session to ping. If that ping is still
//! unanswered at the first check past the threshold, the session is declared
//! dead, so a dead peer is detected at most one interval after the threshold.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often silence is checked.
    pub check_interval: Duration,
    /// Inbound silence tolerated before the session is declared dead.
    pub silence_threshold: Duration,
}

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            silence_threshold: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(check_interval: Duration, silence_threshold: Duration) -> Self {
        Self {
            check_interval,
            silence_threshold,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &crate::WebSocketSettings) -> Self {
        Self {
            check_interval: settings.heartbeat_interval,
            silence_threshold: settings.heartbeat_timeout,
        }
    }
}

/// Requests emitted by the supervisor to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping frame.
    SendPing,
    /// The peer stayed silent through a ping; tear the session down.
    Timeout {
        /// Silence observed when the timeout fired.
        silent_for: Duration,
    },
}

/// Liveness state shared between the supervisor and its session.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    ping_outstanding: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create fresh state with activity recorded now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            ping_outstanding: AtomicBool::new(false),
        }
    }

    /// Record an inbound frame of any kind.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.ping_outstanding.store(false, Ordering::SeqCst);
    }

    /// Record that a ping was written to the socket.
    pub fn mark_ping_sent(&self) {
        self.ping_outstanding.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is awaiting any inbound frame.
    #[must_use]
    pub fn is_ping_outstanding(&self) -> bool {
        self.ping_outstanding.load(Ordering::SeqCst)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Reset for a newly live session.
    pub fn reset(&self) {
        self.record_activity();
    }
}

/// Periodic silence checker for one live session.
///
/// # Example
///
/// ```rust,no_run
/// use market_stream_ingest::infrastructure::polygon::heartbeat::{
///     HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatSupervisor,
/// };
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let state = Arc::new(HeartbeatState::new());
///     let (event_tx, mut event_rx) = mpsc::channel(8);
///     let cancel = CancellationToken::new();
///
///     let supervisor =
///         HeartbeatSupervisor::new(HeartbeatConfig::default(), state.clone(), event_tx, cancel);
///     tokio::spawn(supervisor.run());
///
///     while let Some(event) = event_rx.recv().await {
///         match event {
///             HeartbeatEvent::SendPing => state.mark_ping_sent(),
///             HeartbeatEvent::Timeout { .. } => break,
///         }
///     }
/// }
/// ```
pub struct HeartbeatSupervisor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatSupervisor {
    /// Create a new supervisor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the session goes away, or a timeout fires.
    pub async fn run(self) {
        let period = self.config.check_interval.max(MIN_CHECK_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat supervisor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check().await {
                        break;
                    }
                }
            }
        }
    }

    /// One silence check. Returns `false` when supervision should stop.
    async fn check(&self) -> bool {
        let silent_for = self.state.silence();
        let ping_after = self
            .config
            .silence_threshold
            .saturating_sub(self.config.check_interval);
        if silent_for <= ping_after {
            return true;
        }

        if self.state.is_ping_outstanding() {
            if silent_for <= self.config.silence_threshold {
                return true;
            }
            tracing::warn!(
                silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                threshold_ms =
                    u64::try_from(self.config.silence_threshold.as_millis()).unwrap_or(u64::MAX),
                "Heartbeat timeout: ping unanswered"
            );
            let _ = self
                .event_tx
                .send(HeartbeatEvent::Timeout { silent_for })
                .await;
            return false;
        }

        tracing::debug!(
            silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
            "Inbound silence, requesting ping"
        );
        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Session gone, stopping heartbeat");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(state: &HeartbeatState, by: Duration) {
        *state.last_activity.write() = Instant::now().checked_sub(by).unwrap();
    }

    fn spawn_supervisor(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
    ) -> (
        mpsc::Receiver<HeartbeatEvent>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        let supervisor = HeartbeatSupervisor::new(config, state, event_tx, cancel.clone());
        (event_rx, cancel, tokio::spawn(supervisor.run()))
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.silence_threshold, Duration::from_secs(30));
    }

    #[test]
    fn activity_clears_outstanding_ping() {
        let state = HeartbeatState::new();
        state.mark_ping_sent();
        assert!(state.is_ping_outstanding());

        state.record_activity();
        assert!(!state.is_ping_outstanding());
        assert!(state.silence() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn quiet_session_within_threshold_emits_nothing() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_secs(10));
        let state = Arc::new(HeartbeatState::new());
        let (mut event_rx, cancel, handle) = spawn_supervisor(config, state);

        let received = tokio::time::timeout(Duration::from_millis(120), event_rx.recv()).await;
        assert!(received.is_err(), "no event expected while active");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn silence_requests_ping() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_millis(50));
        let state = Arc::new(HeartbeatState::new());
        backdate(&state, Duration::from_millis(200));
        let (mut event_rx, cancel, handle) = spawn_supervisor(config, state);

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should not close");
        assert_eq!(event, HeartbeatEvent::SendPing);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unanswered_ping_times_out() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_millis(50));
        let state = Arc::new(HeartbeatState::new());
        backdate(&state, Duration::from_millis(200));
        state.mark_ping_sent();
        let (mut event_rx, _cancel, handle) = spawn_supervisor(config, state);

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, HeartbeatEvent::Timeout { silent_for } if silent_for >= Duration::from_millis(200)));

        // Supervisor exits on its own after a timeout.
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dead_peer_times_out_at_first_check_past_threshold() {
        let config = HeartbeatConfig::new(Duration::from_secs(5), Duration::from_secs(30));
        let state = Arc::new(HeartbeatState::new());
        let started = Instant::now();
        let (mut event_rx, _cancel, handle) = spawn_supervisor(config, Arc::clone(&state));

        assert_eq!(event_rx.recv().await.unwrap(), HeartbeatEvent::SendPing);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        state.mark_ping_sent();

        let event = event_rx.recv().await.unwrap();
        assert!(matches!(event, HeartbeatEvent::Timeout { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(35));

        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn answered_ping_keeps_the_session() {
        let config = HeartbeatConfig::new(Duration::from_secs(5), Duration::from_secs(30));
        let state = Arc::new(HeartbeatState::new());
        let (mut event_rx, cancel, handle) = spawn_supervisor(config, Arc::clone(&state));

        assert_eq!(event_rx.recv().await.unwrap(), HeartbeatEvent::SendPing);
        state.mark_ping_sent();
        state.record_activity();

        let next = tokio::time::timeout(Duration::from_secs(20), event_rx.recv()).await;
        assert!(next.is_err(), "no event expected after the pong");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_check_interval_does_not_panic() {
        let config = HeartbeatConfig::new(Duration::ZERO, Duration::from_millis(10));
        let state = Arc::new(HeartbeatState::new());
        let (mut event_rx, cancel, handle) = spawn_supervisor(config, state);

        assert_eq!(event_rx.recv().await.unwrap(), HeartbeatEvent::SendPing);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn supervisor_cancellation() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let state = Arc::new(HeartbeatState::new());
        let (_event_rx, cancel, handle) = spawn_supervisor(config, state);

        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "supervisor should shut down on cancellation");
    }
}
