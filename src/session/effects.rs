//! Effekte und Hinweise der Session
//!
//! `CallSession` führt selbst keine I/O aus. Jede Operation liefert eine
//! Liste von Effekten, die der Runner der Reihe nach ausführt.

use super::timers::TimerKind;
use super::types::{ConnectionState, Denomination, Role};
use crate::billing::FinalizeRequest;
use crate::call_engine::{DisableReason, VideoConstraints};
use crate::chat::{ChatMessage, ReactionKind};
use crate::signaling::SignalMessage;
use crate::whiteboard::SharedDisplay;
use serde::Serialize;
use std::time::Duration;

/// Aktion auf der Peer-Verbindung
#[derive(Debug, Clone, PartialEq)]
pub enum PeerAction {
    CreateOffer,
    AcceptOffer(String),
    ApplyAnswer(String),
    AddCandidate(String),
    AttachVideo(VideoConstraints),
    DetachVideo,
    SampleStats,
    Close,
}

/// Auszuführender Effekt
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Nachricht über das Relay senden
    Signal(SignalMessage),
    Peer(PeerAction),
    StartTimer { kind: TimerKind, period: Duration },
    StopTimer(TimerKind),
    CancelAllTimers,
    ReleaseCamera,
    /// Mikrofon und Kamera freigeben
    ReleaseDevices,
    /// Abschlussbuchung beim Wallet-Dienst
    Finalize(FinalizeRequest),
    Notify(SessionNotice),
}

/// Warum eine Session endete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    LocalLeave,
    RemoteLeft,
    RelayDisconnected,
    ConnectionLost,
    BalanceExhausted,
}

/// Hinweis an die Oberfläche
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionNotice {
    StateChanged {
        state: ConnectionState,
    },
    #[serde(rename_all = "camelCase")]
    VideoEnabled {
        renewed: bool,
        remaining_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    VideoWarning {
        remaining_secs: u64,
    },
    VideoDisabled {
        reason: DisableReason,
    },
    RemoteVideoChanged {
        visible: bool,
    },
    #[serde(rename_all = "camelCase")]
    BillingStarted {
        role: Role,
        denomination: Denomination,
        opening_balance: f64,
    },
    LedgerTick {
        minute: u64,
        running: f64,
    },
    LowBalance {
        remaining: f64,
    },
    BalanceExhausted,
    /// Stand laut Wallet-Dienst, ersetzt nicht die laufende Anzeige
    WalletBalance {
        balance: f64,
    },
    Chat {
        message: ChatMessage,
    },
    Reaction {
        kind: ReactionKind,
        sender: String,
    },
    DisplayChanged {
        display: SharedDisplay,
    },
    #[serde(rename_all = "camelCase")]
    WhiteboardUpdated {
        page_number: u32,
    },
    Error {
        message: String,
    },
    Ended {
        reason: EndReason,
    },
}
