//! Geteilte Anzeige: entweder Whiteboard oder ein geteiltes Bild
//!
//! Nur die präsentierende Rolle darf ein Bild teilen oder entfernen. Das
//! gilt auch für Änderungen, die vom Peer eintreffen.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Only the presenting participant can change the shared display")]
    NotPresenter,

    #[error("Image reference must not be empty")]
    EmptyReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SharedDisplay {
    #[default]
    Whiteboard,
    #[serde(rename_all = "camelCase")]
    Image { image_ref: String },
}

#[derive(Debug, Clone)]
pub struct DisplayController {
    presenter: bool,
    remote_presenter: bool,
    current: SharedDisplay,
}

impl DisplayController {
    pub fn new(presenter: bool, remote_presenter: bool) -> Self {
        Self {
            presenter,
            remote_presenter,
            current: SharedDisplay::Whiteboard,
        }
    }

    pub fn current(&self) -> &SharedDisplay {
        &self.current
    }

    pub fn is_presenter(&self) -> bool {
        self.presenter
    }

    /// Zeigt ein Bild anstelle des Whiteboards
    pub fn share_image(&mut self, image_ref: &str) -> Result<String, DisplayError> {
        if !self.presenter {
            return Err(DisplayError::NotPresenter);
        }
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            return Err(DisplayError::EmptyReference);
        }
        self.current = SharedDisplay::Image {
            image_ref: image_ref.to_string(),
        };
        Ok(image_ref.to_string())
    }

    /// Zurück zum Whiteboard. `false` wenn kein Bild aktiv war.
    pub fn remove_image(&mut self) -> Result<bool, DisplayError> {
        if !self.presenter {
            return Err(DisplayError::NotPresenter);
        }
        Ok(self.clear())
    }

    pub fn apply_remote_image(&mut self, image_ref: String) -> Result<bool, DisplayError> {
        if !self.remote_presenter {
            return Err(DisplayError::NotPresenter);
        }
        let next = SharedDisplay::Image { image_ref };
        if self.current == next {
            return Ok(false);
        }
        self.current = next;
        Ok(true)
    }

    pub fn apply_remote_removal(&mut self) -> Result<bool, DisplayError> {
        if !self.remote_presenter {
            return Err(DisplayError::NotPresenter);
        }
        Ok(self.clear())
    }

    fn clear(&mut self) -> bool {
        let changed = self.current != SharedDisplay::Whiteboard;
        self.current = SharedDisplay::Whiteboard;
        changed
    }
}
