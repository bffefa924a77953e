//! Signaling Module - WebSocket Client für das Session-Relay
//!
//! Dieses Modul verwaltet die Kommunikation mit dem Relay:
//! - WebSocket-Verbindung pro Session aufbauen und halten
//! - Nachrichten in Envelopes verpacken und senden
//! - Eingehende Nachrichten filtern und weiterleiten
//!

mod client;
mod messages;

pub use client::{session_url, DuplicateFilter, RelayClient, RelayEvent, SignalSink, SignalingError};
pub use messages::{RelayEnvelope, SignalMessage};
