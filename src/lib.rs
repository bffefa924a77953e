//! coincall - Live-Session-Engine für bezahlte Zwei-Personen-Gespräche
//!
//! Eine Session-Engine mit:
//! - WebSocket-Relay als Signaling-Kanal pro Session
//! - WebRTC für Audio und zeitlich begrenztes Video
//! - kollaborativem Whiteboard, Chat und Reaktionen
//! - minutengenauer Coin-Abrechnung gegen einen Wallet-Dienst

pub mod billing;
pub mod call_engine;
pub mod chat;
pub mod config;
pub mod session;
pub mod signaling;
pub mod whiteboard;

pub use config::{ConfigError, EngineConfig};
pub use session::{
    start_session, CallSession, EndReason, SessionDeps, SessionError, SessionHandle,
    SessionInfo, SessionNotice, SessionSummary,
};

use tracing_subscriber::EnvFilter;

/// Standard-Filter, wenn `RUST_LOG` nicht gesetzt ist
const DEFAULT_LOG_FILTER: &str = "coincall=debug,webrtc=warn";

/// Initialisiert das Logging. Mehrfache Aufrufe sind unschädlich.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
