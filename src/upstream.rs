//! Duplex WebSocket connection to the upstream conversational speech
//! service, with automatic reconnect and exponential backoff.
//!
//! ```text
//!  Orchestrator          UpstreamClient             Upstream service
//!  ───────────── send()─▶ ┌──────────────┐ ──WS(binary)──▶
//!                         │ supervisor    │
//!  ◀── OrchestratorEvent ─│ reader/writer │ ◀──WS(text/binary)──
//!                         └──────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::PipelineError;
use crate::events::OrchestratorEvent;

/// Hard ceiling on consecutive failed connection attempts before the
/// client gives up and surfaces a terminal error.
const MAX_ATTEMPTS: u32 = 5;
/// Backoff cap: `1s * 2^(attempt-1)`, clamped here.
const MAX_BACKOFF_SECS: u64 = 30;

/// Connection lifecycle. `Open` is the only state in which `send()` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Disconnected,
    Connecting,
    Open,
    ReconnectPending,
}

fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(5));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

fn build_url(config: &UpstreamConfig) -> Result<Url, PipelineError> {
    let mut url = Url::parse(&config.base_url)
        .map_err(|e| PipelineError::Config(format!("invalid upstream base_url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("api_key", &config.api_key)
        .append_pair("language", &config.language);
    Ok(url)
}

pub struct UpstreamClient {
    audio_tx: mpsc::Sender<Vec<u8>>,
    state: Arc<RwLock<UpstreamState>>,
    stop_flag: Arc<AtomicBool>,
    supervisor_handle: tokio::task::JoinHandle<()>,
}

impl UpstreamClient {
    /// Spawn the supervisor task that owns the WebSocket connection for
    /// the lifetime of this client, reconnecting with backoff on every
    /// drop until `MAX_ATTEMPTS` consecutive failures or `stop()`.
    pub fn spawn(config: UpstreamConfig, events_tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        let state = Arc::new(RwLock::new(UpstreamState::Disconnected));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(256);

        let supervisor_state = state.clone();
        let supervisor_stop = stop_flag.clone();
        let supervisor_handle = tokio::spawn(run_supervisor(config, events_tx, supervisor_state, supervisor_stop, audio_rx));

        Self { audio_tx, state, stop_flag, supervisor_handle }
    }

    pub async fn state(&self) -> UpstreamState {
        *self.state.read().await
    }

    /// Send one binary audio frame upstream. Only permitted while `Open`.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), PipelineError> {
        if *self.state.read().await != UpstreamState::Open {
            return Err(PipelineError::NotConnected);
        }
        self.audio_tx
            .send(payload)
            .await
            .map_err(|_| PipelineError::NotConnected)
    }

    /// A lightweight, cloneable handle for the ingress task: never
    /// awaits a lock or channel capacity, so it can't block the
    /// carrier-driven path that owns it.
    pub fn sender(&self) -> UpstreamSender {
        UpstreamSender { audio_tx: self.audio_tx.clone(), state: self.state.clone() }
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.supervisor_handle.abort();
    }
}

/// Non-blocking send handle to the upstream connection, held by the
/// ingress task so it never awaits the `UpstreamClient`'s own lock.
#[derive(Clone)]
pub struct UpstreamSender {
    audio_tx: mpsc::Sender<Vec<u8>>,
    state: Arc<RwLock<UpstreamState>>,
}

impl UpstreamSender {
    /// Forward one frame upstream without ever suspending. Fails
    /// immediately (never retries) if the connection isn't `Open` or the
    /// audio channel is momentarily full.
    pub fn try_send(&self, payload: Vec<u8>) -> Result<(), PipelineError> {
        match self.state.try_read() {
            Ok(guard) if *guard == UpstreamState::Open => {}
            _ => return Err(PipelineError::NotConnected),
        }
        self.audio_tx.try_send(payload).map_err(|_| PipelineError::NotConnected)
    }
}

async fn run_supervisor(
    config: UpstreamConfig,
    events_tx: mpsc::Sender<OrchestratorEvent>,
    state: Arc<RwLock<UpstreamState>>,
    stop_flag: Arc<AtomicBool>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
) {
    let mut attempt: u32 = 0;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }

        attempt += 1;
        *state.write().await = UpstreamState::Connecting;

        let url = match build_url(&config) {
            Ok(u) => u,
            Err(e) => {
                error!(error = %e, "invalid upstream configuration, giving up");
                *state.write().await = UpstreamState::Disconnected;
                let _ = events_tx
                    .send(OrchestratorEvent::Error { kind: "upstream_config".into(), message: e.to_string() })
                    .await;
                return;
            }
        };

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, response)) => {
                info!(status = %response.status(), "upstream WebSocket connected");
                attempt = 0;
                *state.write().await = UpstreamState::Open;
                let _ = events_tx.send(OrchestratorEvent::Connected).await;

                let (disconnect_code, disconnect_reason) =
                    drive_connection(ws_stream, &mut audio_rx, &events_tx).await;

                if stop_flag.load(Ordering::SeqCst) {
                    *state.write().await = UpstreamState::Disconnected;
                    return;
                }

                // A normal close (1000) is the upstream ending the call
                // on its own terms — terminal, no reconnect attempt.
                if disconnect_code == Some(1000) {
                    *state.write().await = UpstreamState::Disconnected;
                    let _ = events_tx
                        .send(OrchestratorEvent::Disconnected { code: disconnect_code, reason: disconnect_reason })
                        .await;
                    return;
                }

                *state.write().await = UpstreamState::ReconnectPending;
                let _ = events_tx
                    .send(OrchestratorEvent::Disconnected { code: disconnect_code, reason: disconnect_reason })
                    .await;
            }
            Err(e) => {
                warn!(attempt, error = %e, "upstream connection attempt failed");
            }
        }

        if attempt >= MAX_ATTEMPTS {
            *state.write().await = UpstreamState::Disconnected;
            let _ = events_tx
                .send(OrchestratorEvent::Error {
                    kind: "upstream_backoff_exhausted".into(),
                    message: PipelineError::BackoffExhausted(MAX_ATTEMPTS).to_string(),
                })
                .await;
            return;
        }

        tokio::time::sleep(backoff_delay(attempt)).await;
    }
}

/// Run the reader/writer duplex for one connection until it closes or
/// errors. Returns the observed close code/reason, if any.
async fn drive_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    audio_rx: &mut mpsc::Receiver<Vec<u8>>,
    events_tx: &mpsc::Sender<OrchestratorEvent>,
) -> (Option<u16>, String) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            Some(payload) = audio_rx.recv() => {
                if let Err(e) = sink.send(tungstenite::Message::Binary(payload)).await {
                    error!(error = %e, "upstream send error");
                    return (None, e.to_string());
                }
            }

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "upstream read error");
                        return (None, e.to_string());
                    }
                    None => return (None, "stream closed".to_string()),
                };

                match msg {
                    tungstenite::Message::Binary(data) => {
                        debug!(len = data.len(), "upstream audio frame received");
                        let _ = events_tx.send(OrchestratorEvent::Audio(data)).await;
                    }
                    tungstenite::Message::Text(text) => {
                        handle_text_event(&text, events_tx).await;
                    }
                    tungstenite::Message::Ping(data) => {
                        let _ = sink.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Close(frame) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                        return (code, reason);
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn handle_text_event(text: &str, events_tx: &mpsc::Sender<OrchestratorEvent>) {
    let event: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to parse upstream event JSON");
            return;
        }
    };

    let event_type = event["type"].as_str().unwrap_or("");
    match event_type {
        "transcript" => {
            if let Some(t) = event["text"].as_str() {
                let _ = events_tx.send(OrchestratorEvent::Transcript(t.to_string())).await;
            }
        }
        "llm_token" => {
            if let Some(t) = event["text"].as_str() {
                let _ = events_tx.send(OrchestratorEvent::LlmToken(t.to_string())).await;
            }
        }
        "llm_done" => {
            if let Some(t) = event["text"].as_str() {
                let _ = events_tx.send(OrchestratorEvent::LlmDone(t.to_string())).await;
            }
        }
        "error" => {
            let message = event["message"].as_str().unwrap_or("unknown").to_string();
            let kind = event["kind"].as_str().unwrap_or("upstream_error").to_string();
            let _ = events_tx.send(OrchestratorEvent::Error { kind, message }).await;
        }
        other => {
            debug!(event_type = other, raw = %text, "unhandled upstream event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn build_url_carries_api_key_and_language() {
        let config = UpstreamConfig {
            base_url: "wss://example.test/ws".to_string(),
            api_key: "secret".to_string(),
            language: "fr".to_string(),
        };
        let url = build_url(&config).unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("api_key"), Some(&"secret".to_string()));
        assert_eq!(query.get("language"), Some(&"fr".to_string()));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let config = UpstreamConfig { base_url: "not a url".to_string(), ..UpstreamConfig::default() };
        assert!(matches!(build_url(&config), Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn send_before_open_is_not_connected() {
        let (events_tx, _events_rx) = mpsc::channel(4);
        let client = UpstreamClient::spawn(
            UpstreamConfig { base_url: "wss://127.0.0.1:1/ws".to_string(), ..UpstreamConfig::default() },
            events_tx,
        );
        let result = client.send(vec![1, 2, 3]).await;
        assert!(matches!(result, Err(PipelineError::NotConnected)));
        client.stop();
    }
}
