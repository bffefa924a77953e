//! Adaptive Video-Steuerung
//!
//! Video ist beim Join aus. Nach dem Einschalten läuft ein Countdown von
//! 120 Sekunden mit Warnphase in den letzten 30 Sekunden. Abschaltgründe in
//! Prioritätsreihenfolge: manuell, Fenster inaktiv, keine Eingabe seit
//! 30 Sekunden, schlechtes Netz, Countdown abgelaufen.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// POLICY & CONSTRAINTS
// ============================================================================

/// Capture-Rahmen für Video mit geringer Bandbreite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub max_bitrate_bps: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frame_rate: 15,
            max_bitrate_bps: 150_000,
        }
    }
}

/// Zeit- und Qualitätsgrenzen der Video-Steuerung
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoPolicy {
    /// Laufzeit nach dem Einschalten
    pub enable_window: Duration,
    /// Restzeit, ab der gewarnt wird
    pub warning_window: Duration,
    /// Maximale Zeit ohne Eingabe
    pub idle_timeout: Duration,
    /// Verlustrate (0.0 - 1.0), ab der das Netz als schlecht gilt
    pub max_packet_loss: f64,
    /// Messfenster für die Verlustrate
    pub sample_interval: Duration,
    pub constraints: VideoConstraints,
}

impl Default for VideoPolicy {
    fn default() -> Self {
        Self {
            enable_window: Duration::from_secs(120),
            warning_window: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
            max_packet_loss: 0.10,
            sample_interval: Duration::from_secs(10),
            constraints: VideoConstraints::default(),
        }
    }
}

// ============================================================================
// STATE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    #[default]
    Good,
    Poor,
}

/// Grund für das Abschalten, geordnet nach Priorität
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisableReason {
    Manual,
    WindowHidden,
    Inactivity,
    PoorNetwork,
    Expired,
    /// Kamera oder Track konnte nicht angehängt werden
    DeviceFailure,
}

/// Sichtbare Phase des lokalen Videos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPhase {
    Off,
    Active { remaining: Duration },
    Warning { remaining: Duration },
}

/// Ergebnis von `VideoController::enable`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoChange {
    /// Video war aus und ist jetzt an
    Enabled,
    /// Video war schon an, Countdown wurde zurückgesetzt
    Renewed,
}

/// Ergebnis eines Countdown-Ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTick {
    Unchanged,
    WarningEntered { remaining: Duration },
    Disabled(DisableReason),
}

/// Lokaler Medienzustand, gehört ausschließlich dem lokalen Prozess
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantMediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub video_expiry_deadline: Option<Instant>,
    pub last_input_activity: Instant,
    pub network_quality: NetworkQuality,
}

impl ParticipantMediaState {
    fn new(now: Instant) -> Self {
        Self {
            audio_enabled: true,
            video_enabled: false,
            video_expiry_deadline: None,
            last_input_activity: now,
            network_quality: NetworkQuality::Good,
        }
    }
}

/// Spiegel des Remote-Medienzustands
///
/// Das explizite `video-state-changed` Signal ist maßgeblich, Track-Events
/// dienen nur als Hinweis solange kein Signal vorliegt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMediaMirror {
    explicit_video: Option<bool>,
    track_hint: Option<bool>,
    audio_present: bool,
}

impl RemoteMediaMirror {
    /// Übernimmt das explizite Signal. `true` wenn sich die Sichtbarkeit ändert.
    pub fn apply_signal(&mut self, is_video_on: bool) -> bool {
        let before = self.video_visible();
        self.explicit_video = Some(is_video_on);
        before != self.video_visible()
    }

    pub fn apply_track_hint(&mut self, video_live: bool) -> bool {
        let before = self.video_visible();
        self.track_hint = Some(video_live);
        before != self.video_visible()
    }

    pub fn set_audio_present(&mut self) {
        self.audio_present = true;
    }

    pub fn audio_present(&self) -> bool {
        self.audio_present
    }

    pub fn video_visible(&self) -> bool {
        self.explicit_video
            .unwrap_or_else(|| self.track_hint.unwrap_or(false))
    }
}

// ============================================================================
// VIDEO CONTROLLER
// ============================================================================

#[derive(Debug)]
pub struct VideoController {
    policy: VideoPolicy,
    local: ParticipantMediaState,
    window_visible: bool,
    warned: bool,
}

impl VideoController {
    pub fn new(policy: VideoPolicy, now: Instant) -> Self {
        Self {
            policy,
            local: ParticipantMediaState::new(now),
            window_visible: true,
            warned: false,
        }
    }

    pub fn policy(&self) -> &VideoPolicy {
        &self.policy
    }

    pub fn local(&self) -> &ParticipantMediaState {
        &self.local
    }

    pub fn is_enabled(&self) -> bool {
        self.local.video_enabled
    }

    /// Schaltet Video ein oder setzt den Countdown zurück
    pub fn enable(&mut self, now: Instant) -> VideoChange {
        let change = if self.local.video_enabled {
            VideoChange::Renewed
        } else {
            self.local.video_enabled = true;
            self.local.network_quality = NetworkQuality::Good;
            VideoChange::Enabled
        };

        self.local.video_expiry_deadline = Some(now + self.policy.enable_window);
        self.local.last_input_activity = now;
        self.warned = false;
        change
    }

    /// Schaltet Video ab. `true` wenn es an war.
    pub fn disable(&mut self, reason: DisableReason) -> bool {
        if !self.local.video_enabled {
            return false;
        }
        tracing::info!("Video disabled: {:?}", reason);
        self.local.video_enabled = false;
        self.local.video_expiry_deadline = None;
        self.warned = false;
        true
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.local.audio_enabled = enabled;
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.local.last_input_activity = now;
    }

    /// Fenster wurde sichtbar/unsichtbar
    pub fn set_window_visible(&mut self, visible: bool) -> Option<DisableReason> {
        self.window_visible = visible;
        if !visible && self.disable(DisableReason::WindowHidden) {
            return Some(DisableReason::WindowHidden);
        }
        None
    }

    /// Neue Netzqualität aus dem Sampler
    pub fn on_network_quality(&mut self, quality: NetworkQuality) -> Option<DisableReason> {
        self.local.network_quality = quality;
        if quality == NetworkQuality::Poor && self.disable(DisableReason::PoorNetwork) {
            return Some(DisableReason::PoorNetwork);
        }
        None
    }

    /// Sekunden-Tick des Countdowns
    pub fn tick(&mut self, now: Instant) -> VideoTick {
        if !self.local.video_enabled {
            return VideoTick::Unchanged;
        }

        if let Some(reason) = self.auto_disable_reason(now) {
            self.disable(reason);
            return VideoTick::Disabled(reason);
        }

        match self.remaining(now) {
            Some(remaining) if !self.warned && remaining <= self.policy.warning_window => {
                self.warned = true;
                VideoTick::WarningEntered { remaining }
            }
            _ => VideoTick::Unchanged,
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.local
            .video_expiry_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn phase(&self, now: Instant) -> VideoPhase {
        match self.remaining(now) {
            None => VideoPhase::Off,
            Some(remaining) if remaining <= self.policy.warning_window => {
                VideoPhase::Warning { remaining }
            }
            Some(remaining) => VideoPhase::Active { remaining },
        }
    }

    fn auto_disable_reason(&self, now: Instant) -> Option<DisableReason> {
        if !self.window_visible {
            return Some(DisableReason::WindowHidden);
        }
        if now.saturating_duration_since(self.local.last_input_activity) >= self.policy.idle_timeout
        {
            return Some(DisableReason::Inactivity);
        }
        if self.local.network_quality == NetworkQuality::Poor {
            return Some(DisableReason::PoorNetwork);
        }
        match self.local.video_expiry_deadline {
            Some(deadline) if now >= deadline => Some(DisableReason::Expired),
            _ => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
