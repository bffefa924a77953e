//! Session-Typen: Rollen, Coin-Stückelung, Teilnehmer und Verbindungsstatus
//!
//! Rollen und Stückelungen kommen als Strings vom Metadaten-Dienst und
//! werden genau einmal beim Session-Start validiert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Anteil des Ausgabe-Satzes, den die verdienende Seite erhält
pub const EARN_SHARE: f64 = 0.75;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown coin denomination: {0}")]
    UnknownDenomination(String),

    #[error("A session needs two distinct participants")]
    InvalidParticipants,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Metadata lookup failed: {0}")]
    Lookup(String),
}

// ============================================================================
// ROLE & DENOMINATION
// ============================================================================

/// Rolle des lokalen Teilnehmers in der Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Zahlt pro Minute
    Payer,
    /// Verdient pro Minute, präsentiert Inhalte
    Earner,
    /// Weder zahlend noch verdienend
    Neutral,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Payer => "payer",
            Role::Earner => "earner",
            Role::Neutral => "neutral",
        }
    }

    /// Darf Bild/Whiteboard-Anzeige für beide Seiten umschalten
    pub fn can_present(&self) -> bool {
        !matches!(self, Role::Payer)
    }

    /// Rolle des Gegenübers in einer Zwei-Personen-Session
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Payer => Role::Earner,
            Role::Earner => Role::Payer,
            Role::Neutral => Role::Neutral,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payer" => Ok(Role::Payer),
            "earner" => Ok(Role::Earner),
            "neutral" => Ok(Role::Neutral),
            other => Err(MetadataError::UnknownRole(other.to_string())),
        }
    }
}

/// Coin-Stückelung, bestimmt Raten und Warnschwellen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    Silver,
    Bronze,
}

impl Denomination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denomination::Silver => "silver",
            Denomination::Bronze => "bronze",
        }
    }

    /// Coins pro Minute für die zahlende Seite
    pub fn spend_rate(&self) -> f64 {
        match self {
            Denomination::Silver => 1.0,
            Denomination::Bronze => 4.0,
        }
    }

    /// Coins pro Minute für die verdienende Seite
    pub fn earn_rate(&self) -> f64 {
        self.spend_rate() * EARN_SHARE
    }

    /// Restguthaben, ab dem einmalig gewarnt wird
    pub fn low_balance_threshold(&self) -> f64 {
        match self {
            Denomination::Silver => 5.0,
            Denomination::Bronze => 20.0,
        }
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Denomination {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silver" => Ok(Denomination::Silver),
            "bronze" => Ok(Denomination::Bronze),
            other => Err(MetadataError::UnknownDenomination(other.to_string())),
        }
    }
}

// ============================================================================
// PARTICIPANTS & STATE
// ============================================================================

/// Referenz auf einen der beiden Teilnehmer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRef {
    pub id: String,
    pub display_name: String,
}

impl ParticipantRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Verbindungsstatus einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Joining,
    Negotiating,
    Connected,
    Ended,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Joining => "joining",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Ended => "ended",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SESSION METADATA
// ============================================================================

/// Rohdaten, wie sie der Metadaten-Dienst liefert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub local: ParticipantRef,
    pub remote: ParticipantRef,
    pub role: String,
    #[serde(default)]
    pub denomination: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_minutes: Option<u32>,
}

/// Validierte Session-Daten
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub local: ParticipantRef,
    pub remote: ParticipantRef,
    pub role: Role,
    pub denomination: Option<Denomination>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_minutes: Option<u32>,
}

impl SessionInfo {
    /// Der Teilnehmer mit der kleineren ID erstellt das erste Offer
    pub fn is_offerer(&self) -> bool {
        self.local.id < self.remote.id
    }

    /// Rolle und Stückelung, falls diese Session abgerechnet wird
    pub fn billing(&self) -> Option<(Role, Denomination)> {
        match (self.role, self.denomination) {
            (Role::Payer | Role::Earner, Some(denomination)) => Some((self.role, denomination)),
            _ => None,
        }
    }
}

impl TryFrom<SessionMetadata> for SessionInfo {
    type Error = MetadataError;

    fn try_from(meta: SessionMetadata) -> Result<Self, Self::Error> {
        if meta.local.id.is_empty() || meta.local.id == meta.remote.id {
            return Err(MetadataError::InvalidParticipants);
        }

        let role: Role = meta.role.parse()?;
        let denomination = meta
            .denomination
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(str::parse::<Denomination>)
            .transpose()?;

        Ok(Self {
            session_id: meta.session_id,
            local: meta.local,
            remote: meta.remote,
            role,
            denomination,
            scheduled_start: meta.scheduled_start,
            scheduled_minutes: meta.scheduled_minutes,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(role: &str, denomination: Option<&str>) -> SessionMetadata {
        SessionMetadata {
            session_id: "s-1".to_string(),
            local: ParticipantRef::new("alice", "Alice"),
            remote: ParticipantRef::new("bob", "Bob"),
            role: role.to_string(),
            denomination: denomination.map(str::to_string),
            scheduled_start: None,
            scheduled_minutes: None,
        }
    }

    #[test]
    fn test_rates_per_denomination() {
        assert_eq!(Denomination::Silver.spend_rate(), 1.0);
        assert_eq!(Denomination::Silver.earn_rate(), 0.75);
        assert_eq!(Denomination::Bronze.spend_rate(), 4.0);
        assert_eq!(Denomination::Bronze.earn_rate(), 3.0);
        assert_eq!(Denomination::Silver.low_balance_threshold(), 5.0);
        assert_eq!(Denomination::Bronze.low_balance_threshold(), 20.0);
    }

    #[test]
    fn test_metadata_is_validated_once() {
        let info = SessionInfo::try_from(metadata(" Payer ", Some("BRONZE"))).unwrap();
        assert_eq!(info.role, Role::Payer);
        assert_eq!(info.denomination, Some(Denomination::Bronze));
        assert_eq!(info.billing(), Some((Role::Payer, Denomination::Bronze)));
        assert!(info.is_offerer());
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        assert_eq!(
            SessionInfo::try_from(metadata("student", None)).unwrap_err(),
            MetadataError::UnknownRole("student".to_string())
        );
        assert_eq!(
            SessionInfo::try_from(metadata("payer", Some("gold"))).unwrap_err(),
            MetadataError::UnknownDenomination("gold".to_string())
        );
    }

    #[test]
    fn test_neutral_or_free_sessions_are_not_billed() {
        let neutral = SessionInfo::try_from(metadata("neutral", Some("silver"))).unwrap();
        assert!(neutral.billing().is_none());

        let free = SessionInfo::try_from(metadata("payer", Some(""))).unwrap();
        assert!(free.billing().is_none());
    }

    #[test]
    fn test_same_participant_twice_is_invalid() {
        let mut meta = metadata("payer", None);
        meta.remote.id = meta.local.id.clone();
        assert_eq!(
            SessionInfo::try_from(meta).unwrap_err(),
            MetadataError::InvalidParticipants
        );
    }
}
