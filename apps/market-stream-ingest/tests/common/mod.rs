//! In-process vendor WebSocket server for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;

use market_stream_ingest::infrastructure::polygon::{ChannelObserver, PolygonMessage};
use market_stream_ingest::{FrequencyKind, StatusEvent};

/// How the vendor answers an auth request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `auth_success`.
    Ack,
    /// No answer at all.
    Silent,
    /// `auth_failed`.
    Reject,
}

/// Scripted vendor.
pub struct MockVendor {
    url: String,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    push_tx: broadcast::Sender<String>,
    silence_tx: watch::Sender<usize>,
    auth_tx: watch::Sender<AuthMode>,
}

impl MockVendor {
    /// Listen on an ephemeral port.
    pub async fn start(auth: AuthMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (push_tx, _) = broadcast::channel(64);
        let (silence_tx, silence_rx) = watch::channel(0);
        let (auth_tx, auth_rx) = watch::channel(auth);

        let vendor = Self {
            url,
            received: Arc::clone(&received),
            connections: Arc::clone(&connections),
            push_tx: push_tx.clone(),
            silence_tx,
            auth_tx,
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    index,
                    auth_rx.clone(),
                    Arc::clone(&received),
                    push_tx.subscribe(),
                    silence_rx.clone(),
                ));
            }
        });

        vendor
    }

    /// Endpoint to connect to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sockets accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every text frame received, across sockets.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Received frames with a given action.
    pub fn requests(&self, action: &str) -> Vec<serde_json::Value> {
        self.received()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["action"] == action)
            .collect()
    }

    /// Send a text frame on every open socket.
    pub fn push(&self, text: &str) {
        let _ = self.push_tx.send(text.to_string());
    }

    /// Stop reading and writing on every socket accepted so far, without
    /// closing them. Later sockets behave normally.
    pub fn go_silent(&self) {
        self.silence_tx.send_replace(self.connections());
    }

    /// Change how later auth requests are answered.
    pub fn set_auth(&self, auth: AuthMode) {
        self.auth_tx.send_replace(auth);
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    index: usize,
    auth: watch::Receiver<AuthMode>,
    received: Arc<Mutex<Vec<String>>>,
    mut pushes: broadcast::Receiver<String>,
    mut silence: watch::Receiver<usize>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let _ = ws
        .send(text(r#"[{"ev":"status","status":"connected","message":"Connected Successfully"}]"#))
        .await;

    loop {
        let silenced = index < *silence.borrow_and_update();
        if silenced {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        tokio::select! {
            _ = silence.changed() => {}
            pushed = pushes.recv() => {
                let Ok(pushed) = pushed else { return };
                if ws.send(text(&pushed)).await.is_err() {
                    return;
                }
            }
            frame = ws.next() => {
                let Some(Ok(frame)) = frame else { return };
                let Message::Text(body) = frame else { continue };
                let body = body.as_str().to_string();
                received.lock().push(body.clone());
                let mode = *auth.borrow();
                if let Some(reply) = reply_to(&body, mode)
                    && ws.send(text(&reply)).await.is_err()
                {
                    return;
                }
            }
        }
    }
}

fn reply_to(body: &str, auth: AuthMode) -> Option<String> {
    let request: serde_json::Value = serde_json::from_str(body).ok()?;
    match request["action"].as_str()? {
        "auth" => match auth {
            AuthMode::Ack => Some(
                r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#.to_string(),
            ),
            AuthMode::Reject => Some(
                r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#
                    .to_string(),
            ),
            AuthMode::Silent => None,
        },
        "subscribe" | "unsubscribe" => Some(format!(
            r#"[{{"ev":"status","status":"success","message":"{}: {}"}}]"#,
            request["action"].as_str()?,
            request["params"].as_str()?
        )),
        _ => None,
    }
}

fn text(body: &str) -> Message {
    Message::Text(body.to_string().into())
}

/// Observer that records everything a channel reports.
#[derive(Default)]
pub struct RecordingObserver {
    pub messages: Mutex<Vec<(FrequencyKind, PolygonMessage)>>,
    pub statuses: Mutex<Vec<StatusEvent>>,
}

#[async_trait]
impl ChannelObserver for RecordingObserver {
    async fn on_message(&self, frequency: FrequencyKind, message: PolygonMessage) {
        self.messages.lock().push((frequency, message));
    }

    async fn on_status(&self, status: StatusEvent) {
        self.statuses.lock().push(status);
    }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
