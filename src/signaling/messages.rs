//! Message Types für das Signaling-Relay
//!
//! Jede Nachricht hat einen Namen (`event`) und einen Payload (`data`).
//! Über die Leitung geht sie im `RelayEnvelope`, damit Empfänger fremde
//! Sessions, eigene Echos und Duplikate erkennen.

use crate::chat::{ChatMessage, ReactionKind};
use crate::session::Role;
use crate::whiteboard::{
    AddPage, AddPoint, ClearPage, RemovePath, ScrollTo, StartPath, SwitchPage, WhiteboardOp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SIGNAL MESSAGES
// ============================================================================

/// Benannte Nachricht zwischen den beiden Teilnehmern einer Session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Beitritt zur Session (lokal → Relay)
    #[serde(rename_all = "camelCase")]
    JoinSession {
        session_id: String,
        role: Role,
        display_name: String,
    },

    /// Der Peer ist beigetreten (Relay → beide)
    PeerJoined,

    Offer { sdp: String },

    Answer { sdp: String },

    IceCandidate { candidate: String },

    /// Bitte an den Offerer, ein neues Offer zu erstellen
    Renegotiate,

    /// Der Peer hat die Session verlassen (Relay → verbleibender Peer)
    PeerLeft,

    #[serde(rename_all = "camelCase")]
    VideoStateChanged { is_video_on: bool },

    WhiteboardStartPath(StartPath),
    WhiteboardAddPoint(AddPoint),
    WhiteboardRemovePath(RemovePath),
    WhiteboardClearPage(ClearPage),
    WhiteboardAddPage(AddPage),
    WhiteboardSwitchPage(SwitchPage),
    WhiteboardScroll(ScrollTo),

    #[serde(rename_all = "camelCase")]
    SharedImage { image_ref: String },

    RemoveImage,

    ChatMessage(ChatMessage),

    Reaction {
        #[serde(rename = "type")]
        kind: ReactionKind,
        sender: String,
    },

    #[serde(rename_all = "camelCase")]
    EndCall {
        session_id: String,
        elapsed_seconds: u64,
        computed_minutes: u64,
    },

    /// Kontostand-Push des Wallet-Dienstes
    CoinUpdate { balance: f64 },
}

impl SignalMessage {
    /// Name auf der Leitung, für Logs
    pub fn name(&self) -> &'static str {
        match self {
            SignalMessage::JoinSession { .. } => "join-session",
            SignalMessage::PeerJoined => "peer-joined",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::Renegotiate => "renegotiate",
            SignalMessage::PeerLeft => "peer-left",
            SignalMessage::VideoStateChanged { .. } => "video-state-changed",
            SignalMessage::WhiteboardStartPath(_) => "whiteboard-start-path",
            SignalMessage::WhiteboardAddPoint(_) => "whiteboard-add-point",
            SignalMessage::WhiteboardRemovePath(_) => "whiteboard-remove-path",
            SignalMessage::WhiteboardClearPage(_) => "whiteboard-clear-page",
            SignalMessage::WhiteboardAddPage(_) => "whiteboard-add-page",
            SignalMessage::WhiteboardSwitchPage(_) => "whiteboard-switch-page",
            SignalMessage::WhiteboardScroll(_) => "whiteboard-scroll",
            SignalMessage::SharedImage { .. } => "shared-image",
            SignalMessage::RemoveImage => "remove-image",
            SignalMessage::ChatMessage(_) => "chat-message",
            SignalMessage::Reaction { .. } => "reaction",
            SignalMessage::EndCall { .. } => "end-call",
            SignalMessage::CoinUpdate { .. } => "coin-update",
        }
    }

    /// Whiteboard-Operation, falls es eine ist
    pub fn into_whiteboard_op(self) -> Result<WhiteboardOp, Self> {
        match self {
            SignalMessage::WhiteboardStartPath(op) => Ok(WhiteboardOp::StartPath(op)),
            SignalMessage::WhiteboardAddPoint(op) => Ok(WhiteboardOp::AddPoint(op)),
            SignalMessage::WhiteboardRemovePath(op) => Ok(WhiteboardOp::RemovePath(op)),
            SignalMessage::WhiteboardClearPage(op) => Ok(WhiteboardOp::ClearPage(op)),
            SignalMessage::WhiteboardAddPage(op) => Ok(WhiteboardOp::AddPage(op)),
            SignalMessage::WhiteboardSwitchPage(op) => Ok(WhiteboardOp::SwitchPage(op)),
            SignalMessage::WhiteboardScroll(op) => Ok(WhiteboardOp::ScrollTo(op)),
            other => Err(other),
        }
    }
}

impl From<WhiteboardOp> for SignalMessage {
    fn from(op: WhiteboardOp) -> Self {
        match op {
            WhiteboardOp::StartPath(op) => SignalMessage::WhiteboardStartPath(op),
            WhiteboardOp::AddPoint(op) => SignalMessage::WhiteboardAddPoint(op),
            WhiteboardOp::RemovePath(op) => SignalMessage::WhiteboardRemovePath(op),
            WhiteboardOp::ClearPage(op) => SignalMessage::WhiteboardClearPage(op),
            WhiteboardOp::AddPage(op) => SignalMessage::WhiteboardAddPage(op),
            WhiteboardOp::SwitchPage(op) => SignalMessage::WhiteboardSwitchPage(op),
            WhiteboardOp::ScrollTo(op) => SignalMessage::WhiteboardScroll(op),
        }
    }
}

// ============================================================================
// RELAY ENVELOPE
// ============================================================================

/// Rahmen um jede Nachricht auf der Leitung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub session_id: String,
    pub sender_id: String,
    pub message_id: Uuid,
    /// Unix-Zeit in Millisekunden
    pub timestamp: i64,
    pub message: SignalMessage,
}

impl RelayEnvelope {
    pub fn new(session_id: &str, sender_id: &str, message: SignalMessage) -> Self {
        Self {
            session_id: session_id.to_string(),
            sender_id: sender_id.to_string(),
            message_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp_millis(),
            message,
        }
    }
}
