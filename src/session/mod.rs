//! Session Module - Lebenszyklus einer Zwei-Personen-Session
//!
//! Dieses Modul verwaltet:
//! - Session-Metadaten und Rollen
//! - den Verbindungszustand (Join, Offer/Answer, Renegotiation, Ende)
//! - die `CallSession`, die alle Teilbereiche zusammenführt
//! - den Runner, der Effekte gegen Relay, Peer, Geräte und Wallet ausführt

mod call;
mod directory;
mod effects;
mod lifecycle;
mod runner;
mod timers;
mod types;

pub use call::{
    CallSession, LedgerSnapshot, Outcome, SessionError, SessionSnapshot, SessionSummary,
};
pub use directory::{SessionDirectory, StaticDirectory};
pub use effects::{Effect, EndReason, PeerAction, SessionNotice};
pub use lifecycle::{
    ConnectionLifecycle, LifecycleError, NegotiationOutcome, OfferDecision, Renegotiation,
};
pub use runner::{start_session, SessionDeps, SessionHandle};
pub use timers::{TimerKind, TimerSet, COUNTDOWN_TICK, ELAPSED_TICK};
pub use types::{
    ConnectionState, Denomination, MetadataError, ParticipantRef, Role, SessionInfo,
    SessionMetadata, EARN_SHARE,
};
