//! Chat und Reaktionen
//!
//! Chat ist ein append-only Log ohne Bestätigung. Reaktionen werden auf
//! beiden Seiten lokal angezeigt und jeweils 5 Sekunden nach der lokalen
//! Erstellung entfernt, ohne Abgleich zwischen den Teilnehmern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Maximale Länge einer Chat-Nachricht in Zeichen
pub const MAX_CHAT_LENGTH: usize = 2000;

/// Lebensdauer einer Reaktion
pub const REACTION_TTL: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message is empty")]
    Empty,

    #[error("Message exceeds {0} characters")]
    TooLong(usize),
}

// ============================================================================
// CHAT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Neue lokale Nachricht, wird angehängt und zurückgegeben
    pub fn compose(&mut self, sender: &str, text: &str) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }
        if text.chars().count() > MAX_CHAT_LENGTH {
            return Err(ChatError::TooLong(MAX_CHAT_LENGTH));
        }

        let message = ChatMessage {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());
        Ok(message)
    }

    /// Nachricht des Peers anhängen
    pub fn receive(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

// ============================================================================
// REACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReactionKind {
    ThumbsUp,
    Heart,
    Laugh,
    Clap,
    Surprised,
    Raise,
    /// Unbekannte Reaktion einer neueren Gegenstelle
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub id: Uuid,
    pub kind: ReactionKind,
    pub sender: String,
    /// Lokaler Erstellungszeitpunkt, maßgeblich für das Ablaufen
    pub created_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct ReactionBoard {
    events: Vec<ReactionEvent>,
}

impl ReactionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: ReactionKind, sender: &str, now: Instant) -> ReactionEvent {
        self.prune(now);
        let event = ReactionEvent {
            id: Uuid::new_v4(),
            kind,
            sender: sender.to_string(),
            created_at: now,
        };
        self.events.push(event.clone());
        event
    }

    /// Entfernt abgelaufene Reaktionen, gibt die Anzahl zurück
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.events.len();
        self.events
            .retain(|e| now.saturating_duration_since(e.created_at) < REACTION_TTL);
        before - self.events.len()
    }

    /// Aktive Reaktionen zum Zeitpunkt `now`
    pub fn active(&self, now: Instant) -> Vec<&ReactionEvent> {
        self.events
            .iter()
            .filter(|e| now.saturating_duration_since(e.created_at) < REACTION_TTL)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_is_append_only() {
        let mut log = ChatLog::new();
        let sent = log.compose("alice", "  hallo  ").unwrap();
        assert_eq!(sent.text, "hallo");

        log.receive(ChatMessage {
            sender: "bob".to_string(),
            text: "hi".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].sender, "alice");
        assert_eq!(log.messages()[1].sender, "bob");
    }

    #[test]
    fn test_chat_validation() {
        let mut log = ChatLog::new();
        assert_eq!(log.compose("alice", "   "), Err(ChatError::Empty));
        let long = "x".repeat(MAX_CHAT_LENGTH + 1);
        assert_eq!(
            log.compose("alice", &long),
            Err(ChatError::TooLong(MAX_CHAT_LENGTH))
        );
        assert!(log.is_empty());
    }

    #[test]
    fn test_reaction_expires_after_five_seconds() {
        let start = Instant::now();
        let mut board = ReactionBoard::new();
        board.add(ReactionKind::Heart, "alice", start);
        board.add(ReactionKind::Clap, "bob", start + Duration::from_secs(3));

        let at = |millis: u64| start + Duration::from_millis(millis);
        assert_eq!(board.active(at(4_999)).len(), 2);
        assert_eq!(board.active(at(5_000)).len(), 1);
        assert_eq!(board.active(at(8_000)).len(), 0);

        assert_eq!(board.prune(at(5_000)), 1);
        assert_eq!(board.len(), 1);
        assert_eq!(board.prune(at(8_000)), 1);
        assert!(board.is_empty());
    }

    #[test]
    fn test_unknown_reaction_kind() {
        let kind: ReactionKind = serde_json::from_str("\"party-popper\"").unwrap();
        assert_eq!(kind, ReactionKind::Unknown);
        let kind: ReactionKind = serde_json::from_str("\"thumbs-up\"").unwrap();
        assert_eq!(kind, ReactionKind::ThumbsUp);
    }
}
