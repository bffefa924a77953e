//! Konfiguration aus Umgebungsvariablen

use crate::call_engine::{default_ice_servers, VideoPolicy};
use crate::session::{ParticipantRef, SessionMetadata};
use std::env;
use thiserror::Error;
use url::Url;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Standard-Relay, falls `RELAY_URL` nicht gesetzt ist
pub const DEFAULT_RELAY_URL: &str = "wss://relay.coincall.invalid/session";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub relay_url: Url,
    pub ice_servers: Vec<RTCIceServer>,
    pub display_name: Option<String>,
    pub video_policy: VideoPolicy,
}

impl EngineConfig {
    /// Liest `RELAY_URL`, `ICE_SERVERS`, `TURN_*` und `DISPLAY_NAME`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let relay_url = lookup("RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());
        let relay_url = parse_relay_url(&relay_url)?;

        let mut ice_servers = match lookup("ICE_SERVERS") {
            Some(list) => {
                let urls: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect();
                if urls.is_empty() {
                    default_ice_servers()
                } else {
                    vec![RTCIceServer {
                        urls,
                        ..Default::default()
                    }]
                }
            }
            None => default_ice_servers(),
        };

        if let Some(turn_url) = lookup("TURN_URL") {
            let username = lookup("TURN_USERNAME").ok_or(ConfigError::Missing("TURN_USERNAME"))?;
            let credential =
                lookup("TURN_CREDENTIAL").ok_or(ConfigError::Missing("TURN_CREDENTIAL"))?;
            ice_servers.push(RTCIceServer {
                urls: vec![turn_url],
                username,
                credential,
                ..Default::default()
            });
        }

        Ok(Self {
            relay_url,
            ice_servers,
            display_name: lookup("DISPLAY_NAME").filter(|n| !n.trim().is_empty()),
            video_policy: VideoPolicy::default(),
        })
    }
}

/// Akzeptiert http(s) und ws(s), liefert immer ws(s)
pub fn parse_relay_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "RELAY_URL",
        reason,
    };

    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot use scheme {scheme}")))?;
    Ok(url)
}

/// Session-Metadaten für das Demo-Binary
///
/// `SESSION_ID`, `PARTICIPANT_ID`, `PEER_ID` und `ROLE` sind Pflicht,
/// `PEER_NAME` und `DENOMINATION` optional.
pub fn metadata_from_env(display_name: Option<&str>) -> Result<SessionMetadata, ConfigError> {
    metadata_from_lookup(|name| env::var(name).ok(), display_name)
}

fn metadata_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
    display_name: Option<&str>,
) -> Result<SessionMetadata, ConfigError> {
    let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

    let local_id = required("PARTICIPANT_ID")?;
    let remote_id = required("PEER_ID")?;
    let remote_name = lookup("PEER_NAME").unwrap_or_else(|| remote_id.clone());
    let local_name = display_name.map(str::to_string).unwrap_or_else(|| local_id.clone());

    Ok(SessionMetadata {
        session_id: required("SESSION_ID")?,
        local: ParticipantRef::new(local_id, local_name),
        remote: ParticipantRef::new(remote_id, remote_name),
        role: required("ROLE")?,
        denomination: lookup("DENOMINATION"),
        scheduled_start: None,
        scheduled_minutes: None,
    })
}

/// Startguthaben des In-Process-Wallets (`OPENING_BALANCE`, Standard 0)
pub fn opening_balance_from_env() -> Result<f64, ConfigError> {
    match env::var("OPENING_BALANCE") {
        Ok(raw) => raw.trim().parse::<f64>().map_err(|e| ConfigError::Invalid {
            name: "OPENING_BALANCE",
            reason: e.to_string(),
        }),
        Err(_) => Ok(0.0),
    }
}
