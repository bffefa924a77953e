//! WebSocket Client für das Signaling-Relay
//!
//! Eine Verbindung pro Session:
//! - Read-Task parst Envelopes und filtert fremde Sessions, Echos und Duplikate
//! - Write-Task sendet Nachrichten und hält die Verbindung per Ping am Leben
//! - Ereignisse gehen über einen Kanal an den Session-Runner

use super::messages::{RelayEnvelope, SignalMessage};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

/// Intervall für WebSocket-Pings
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Größe der Warteschlange für ausgehende Nachrichten
const OUTBOUND_CAPACITY: usize = 512;

/// Anzahl der gemerkten Message-IDs für die Duplikaterkennung
const DEDUP_WINDOW: usize = 1024;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to relay")]
    NotConnected,

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

// ============================================================================
// RELAY EVENTS
// ============================================================================

/// Events die vom RelayClient ausgelöst werden
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Verbunden mit dem Relay
    Connected,

    /// Nachricht des Peers (oder des Relays/Wallet-Dienstes)
    Message {
        sender_id: String,
        message: SignalMessage,
    },

    /// Verbindung getrennt
    Disconnected,
}

/// Ausgang für Signaling-Nachrichten einer Session
pub trait SignalSink: Send + Sync {
    /// Stellt eine Nachricht zum Senden ein, ohne zu blockieren
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;
}

// ============================================================================
// DUPLICATE FILTER
// ============================================================================

/// Merkt sich die zuletzt gesehenen Message-IDs
#[derive(Debug)]
pub struct DuplicateFilter {
    capacity: usize,
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl DuplicateFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// `true` wenn die ID neu ist
    pub fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

// ============================================================================
// CLIENT STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct ClientState {
    is_connected: bool,
    messages_sent: u64,
    messages_received: u64,
}

// ============================================================================
// RELAY CLIENT
// ============================================================================

/// WebSocket Client für eine Session
pub struct RelayClient {
    url: Url,
    session_id: String,
    participant_id: String,
    state: Arc<RwLock<ClientState>>,
    tx: mpsc::Sender<String>,
    tasks: Vec<JoinHandle<()>>,
}

/// Baut die WebSocket-URL einer Session
pub fn session_url(base: &Url, session_id: &str, participant_id: &str) -> Result<Url, SignalingError> {
    let mut url = base.clone();
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(SignalingError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| SignalingError::InvalidUrl(base.to_string()))?;
    url.query_pairs_mut()
        .append_pair("session", session_id)
        .append_pair("participant", participant_id);
    Ok(url)
}

impl RelayClient {
    /// Verbindet mit dem Relay und startet Read- und Write-Task
    pub async fn connect(
        base_url: &Url,
        session_id: &str,
        participant_id: &str,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Result<Self, SignalingError> {
        let url = session_url(base_url, session_id, participant_id)?;

        tracing::info!("Connecting to relay: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SignalingError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let state = Arc::new(RwLock::new(ClientState {
            is_connected: true,
            ..Default::default()
        }));

        let _ = events.send(RelayEvent::Connected);

        // Read-Task starten
        let state_clone = Arc::clone(&state);
        let own_session = session_id.to_string();
        let own_id = participant_id.to_string();
        let read_task = tokio::spawn(async move {
            let mut dedup = DuplicateFilter::new(DEDUP_WINDOW);

            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let envelope = match serde_json::from_str::<RelayEnvelope>(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::warn!("Dropping undecodable relay frame: {}", e);
                                continue;
                            }
                        };

                        if envelope.session_id != own_session {
                            tracing::debug!("Dropping frame for session {}", envelope.session_id);
                            continue;
                        }
                        if envelope.sender_id == own_id {
                            continue;
                        }
                        if !dedup.insert(envelope.message_id) {
                            tracing::debug!(
                                "Dropping duplicate {} ({})",
                                envelope.message.name(),
                                envelope.message_id
                            );
                            continue;
                        }

                        state_clone.write().messages_received += 1;
                        let _ = events.send(RelayEvent::Message {
                            sender_id: envelope.sender_id,
                            message: envelope.message,
                        });
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by relay");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            state_clone.write().is_connected = false;
            let _ = events.send(RelayEvent::Disconnected);
        });

        // Write-Task starten
        let write_task = tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            // der erste Tick kommt sofort
            keepalive.tick().await;

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(Message::Text(msg)).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }
                    _ = keepalive.tick() => {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            tracing::warn!("Failed to send keep-alive ping: {}", e);
                            break;
                        }
                    }
                }
            }

            let _ = write.close().await;
        });

        Ok(Self {
            url,
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            state,
            tx,
            tasks: vec![read_task, write_task],
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Prüft ob verbunden
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected
    }

    /// Trennt die Verbindung und beendet beide Tasks
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.state.write().is_connected = false;
    }
}

impl SignalSink for RelayClient {
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::NotConnected);
        }

        let name = message.name();
        let envelope = RelayEnvelope::new(&self.session_id, &self.participant_id, message);
        let msg_string = serde_json::to_string(&envelope)
            .map_err(|e| SignalingError::SendFailed(e.to_string()))?;

        // try_send ist non-blocking
        self.tx
            .try_send(msg_string)
            .map_err(|e| SignalingError::SendFailed(format!("{name}: {e}")))?;

        self.state.write().messages_sent += 1;
        Ok(())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.url.as_str())
            .field("session_id", &self.session_id)
            .field("state", &*self.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_filter_is_bounded() {
        let mut filter = DuplicateFilter::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert!(filter.insert(a));
        assert!(!filter.insert(a));
        assert!(filter.insert(b));
        assert!(filter.insert(c));

        // a ist aus dem Fenster gefallen
        assert!(filter.insert(a));
        assert!(!filter.insert(c));
    }

    #[test]
    fn test_session_url() {
        let base = Url::parse("https://relay.example.com/ws").unwrap();
        let url = session_url(&base, "s-1", "alice").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://relay.example.com/ws?session=s-1&participant=alice"
        );

        let base = Url::parse("http://localhost:8787/ws").unwrap();
        assert_eq!(session_url(&base, "s", "p").unwrap().scheme(), "ws");

        let base = Url::parse("ftp://relay.example.com").unwrap();
        assert!(matches!(
            session_url(&base, "s", "p"),
            Err(SignalingError::InvalidUrl(_))
        ));
    }
}
