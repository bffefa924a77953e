//! Zugriff auf den Session-Metadaten-Dienst

use super::types::{MetadataError, SessionInfo, SessionMetadata};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Liefert Rolle, Stückelung und Teilnehmer einer Session vor dem Join
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Result<SessionMetadata, MetadataError>;

    /// Holt und validiert die Metadaten in einem Schritt
    async fn resolve(&self, session_id: &str) -> Result<SessionInfo, MetadataError> {
        let meta = self.fetch(session_id).await?;
        SessionInfo::try_from(meta)
    }
}

/// Verzeichnis mit fest vorgegebenen Einträgen (Konfiguration, Tests)
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: RwLock<HashMap<String, SessionMetadata>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, meta: SessionMetadata) {
        self.entries.write().insert(meta.session_id.clone(), meta);
    }
}

#[async_trait]
impl SessionDirectory for StaticDirectory {
    async fn fetch(&self, session_id: &str) -> Result<SessionMetadata, MetadataError> {
        self.entries
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| MetadataError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{ParticipantRef, Role};

    #[tokio::test]
    async fn test_resolve_known_and_unknown_sessions() {
        let directory = StaticDirectory::new();
        directory.insert(SessionMetadata {
            session_id: "s-42".to_string(),
            local: ParticipantRef::new("a", "A"),
            remote: ParticipantRef::new("b", "B"),
            role: "earner".to_string(),
            denomination: Some("silver".to_string()),
            scheduled_start: None,
            scheduled_minutes: Some(30),
        });

        let info = directory.resolve("s-42").await.unwrap();
        assert_eq!(info.role, Role::Earner);

        assert_eq!(
            directory.resolve("missing").await.unwrap_err(),
            MetadataError::SessionNotFound("missing".to_string())
        );
    }
}
