//! CallSession: Zustand einer laufenden Zwei-Personen-Session
//!
//! Die Session hält Lebenszyklus, Video-Steuerung, Whiteboard, Ledger, Chat
//! und Reaktionen. Sie wird ausschließlich vom Runner aufgerufen, liest die
//! Zeit nur über den übergebenen `now` und liefert Effekte zurück.

use super::effects::{Effect, EndReason, PeerAction, SessionNotice};
use super::lifecycle::{
    ConnectionLifecycle, LifecycleError, NegotiationOutcome, OfferDecision, Renegotiation,
};
use super::timers::{TimerKind, COUNTDOWN_TICK, ELAPSED_TICK};
use super::types::{ConnectionState, Denomination, MetadataError, Role, SessionInfo};
use crate::billing::{CoinLedger, LedgerEvent, WalletError};
use crate::call_engine::{
    DeviceError, DisableReason, InboundStats, LinkState, NetworkQualitySampler,
    ParticipantMediaState, PeerError, PeerEvent, RemoteMediaMirror, TrackKind, VideoChange,
    VideoConstraints, VideoController, VideoPhase, VideoPolicy, VideoTick,
};
use crate::chat::{ChatError, ChatLog, ChatMessage, ReactionBoard, ReactionEvent, ReactionKind};
use crate::signaling::{SignalMessage, SignalingError};
use crate::whiteboard::{
    DisplayController, DisplayError, Point, SharedDisplay, Tool, WhiteboardDocument,
    WhiteboardError, WhiteboardOp,
};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid session metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Media device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Whiteboard error: {0}")]
    Whiteboard(#[from] WhiteboardError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Video requires an established connection (state: {0})")]
    VideoUnavailable(ConnectionState),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session task failed: {0}")]
    Runner(String),
}

/// Ergebnis einer Benutzeraktion samt auszuführender Effekte
pub type Outcome<T> = Result<(T, Vec<Effect>), SessionError>;

// ============================================================================
// SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub role: Role,
    pub denomination: Denomination,
    pub rate_per_minute: f64,
    pub opening_balance: f64,
    /// Restguthaben (Payer) oder Verdienst (Earner)
    pub running: f64,
    pub billed_minutes: u64,
    pub amount: f64,
    pub wallet_balance: Option<f64>,
}

impl From<&CoinLedger> for LedgerSnapshot {
    fn from(ledger: &CoinLedger) -> Self {
        Self {
            role: ledger.role(),
            denomination: ledger.denomination(),
            rate_per_minute: ledger.rate_per_minute(),
            opening_balance: ledger.opening_balance(),
            running: ledger.running(),
            billed_minutes: ledger.billed_minutes(),
            amount: ledger.amount(),
            wallet_balance: ledger.wallet_balance(),
        }
    }
}

/// Momentaufnahme für die Oberfläche
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: ConnectionState,
    pub local_media: ParticipantMediaState,
    pub video_phase: VideoPhase,
    pub remote_video_visible: bool,
    pub whiteboard: WhiteboardDocument,
    pub display: SharedDisplay,
    pub chat: Vec<ChatMessage>,
    pub active_reactions: Vec<ReactionKind>,
    pub elapsed_secs: u64,
    pub ledger: Option<LedgerSnapshot>,
}

/// Ergebnis einer beendeten Session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub end_reason: Option<EndReason>,
    pub elapsed_secs: u64,
    pub billed_minutes: u64,
    pub ledger: Option<LedgerSnapshot>,
    pub finalized: bool,
    pub chat_messages: usize,
    pub pages: usize,
}

// ============================================================================
// CALL SESSION
// ============================================================================

#[derive(Debug)]
pub struct CallSession {
    info: SessionInfo,
    lifecycle: ConnectionLifecycle,
    video: VideoController,
    sampler: NetworkQualitySampler,
    remote_media: RemoteMediaMirror,
    whiteboard: WhiteboardDocument,
    display: DisplayController,
    chat: ChatLog,
    reactions: ReactionBoard,
    ledger: Option<CoinLedger>,
    local_media_ready: bool,
    billing_started_at: Option<Instant>,
    ended_at: Option<Instant>,
    end_reason: Option<EndReason>,
    finalized: bool,
}

impl CallSession {
    /// `opening_balance` ist der Kontostand laut Wallet beim Join
    pub fn new(info: SessionInfo, policy: VideoPolicy, opening_balance: f64, now: Instant) -> Self {
        let ledger = info
            .billing()
            .and_then(|(role, denomination)| CoinLedger::for_role(role, denomination, opening_balance));

        Self {
            lifecycle: ConnectionLifecycle::new(info.is_offerer()),
            video: VideoController::new(policy, now),
            sampler: NetworkQualitySampler::new(policy.max_packet_loss),
            remote_media: RemoteMediaMirror::default(),
            whiteboard: WhiteboardDocument::new(),
            display: DisplayController::new(
                info.role.can_present(),
                info.role.counterpart().can_present(),
            ),
            chat: ChatLog::new(),
            reactions: ReactionBoard::new(),
            ledger,
            local_media_ready: false,
            billing_started_at: None,
            ended_at: None,
            end_reason: None,
            finalized: false,
            info,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn is_ended(&self) -> bool {
        self.lifecycle.is_ended()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn video_enabled(&self) -> bool {
        self.video.is_enabled()
    }

    pub fn video_constraints(&self) -> VideoConstraints {
        self.video.policy().constraints
    }

    pub fn ledger(&self) -> Option<&CoinLedger> {
        self.ledger.as_ref()
    }

    pub fn whiteboard(&self) -> &WhiteboardDocument {
        &self.whiteboard
    }

    pub fn billing_started(&self) -> bool {
        self.billing_started_at.is_some()
    }

    /// Sekunden seit Start der Abrechnung (beide Medienströme verbunden)
    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        match self.billing_started_at {
            Some(start) => self
                .ended_at
                .unwrap_or(now)
                .saturating_duration_since(start)
                .as_secs(),
            None => 0,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_ended() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Idle → Joining. Das Mikrofon ist zu diesem Zeitpunkt bereits belegt.
    pub fn join(&mut self) -> Result<Vec<Effect>, SessionError> {
        self.lifecycle.begin_join()?;
        self.local_media_ready = true;

        tracing::info!(
            "Joining session {} as {} ({})",
            self.info.session_id,
            self.info.role,
            if self.lifecycle.is_offerer() { "offerer" } else { "answerer" }
        );

        Ok(vec![
            Effect::Signal(SignalMessage::JoinSession {
                session_id: self.info.session_id.clone(),
                role: self.info.role,
                display_name: self.info.local.display_name.clone(),
            }),
            Effect::StartTimer {
                kind: TimerKind::Elapsed,
                period: ELAPSED_TICK,
            },
            Effect::Notify(SessionNotice::StateChanged {
                state: ConnectionState::Joining,
            }),
        ])
    }

    /// Eingehende Relay-Nachricht
    pub fn handle_signal(&mut self, sender_id: &str, message: SignalMessage, now: Instant) -> Vec<Effect> {
        if self.is_ended() {
            tracing::debug!("Ignoring {} after session end", message.name());
            return Vec::new();
        }

        let before = self.lifecycle.state();
        let mut effects = Vec::new();

        let message = match message.into_whiteboard_op() {
            Ok(op) => {
                self.apply_remote_whiteboard(op, &mut effects);
                return effects;
            }
            Err(message) => message,
        };

        match message {
            SignalMessage::JoinSession { .. } => {
                tracing::debug!("Ignoring join-session from {}", sender_id);
            }

            SignalMessage::PeerJoined => {
                if self.lifecycle.on_peer_joined() {
                    tracing::info!("Peer joined, creating offer");
                    effects.push(Effect::Peer(PeerAction::CreateOffer));
                } else {
                    tracing::info!("Peer joined, waiting for offer");
                }
            }

            SignalMessage::Offer { sdp } => match self.lifecycle.on_remote_offer() {
                OfferDecision::Accept => effects.push(Effect::Peer(PeerAction::AcceptOffer(sdp))),
                OfferDecision::IgnoreGlare => {
                    tracing::info!("Offer collision, keeping local offer");
                }
                OfferDecision::Drop => {
                    tracing::debug!("Dropping offer in state {}", self.lifecycle.state());
                }
            },

            SignalMessage::Answer { sdp } => {
                if self.lifecycle.accepts_answer() {
                    effects.push(Effect::Peer(PeerAction::ApplyAnswer(sdp)));
                } else {
                    tracing::debug!("Ignoring unexpected answer");
                }
            }

            SignalMessage::IceCandidate { candidate } => {
                if let Some(candidate) = self.lifecycle.accept_remote_candidate(candidate) {
                    effects.push(Effect::Peer(PeerAction::AddCandidate(candidate)));
                }
            }

            SignalMessage::Renegotiate => {
                if self.lifecycle.is_offerer() {
                    tracing::info!("Peer requested renegotiation");
                    self.renegotiate(&mut effects);
                } else {
                    tracing::debug!("Ignoring renegotiation request as answerer");
                }
            }

            SignalMessage::PeerLeft => {
                tracing::info!("Peer left session {}", self.info.session_id);
                return self.end(EndReason::RemoteLeft, now);
            }

            SignalMessage::EndCall {
                elapsed_seconds,
                computed_minutes,
                ..
            } => {
                tracing::info!(
                    "Peer ended the call after {}s ({} min)",
                    elapsed_seconds,
                    computed_minutes
                );
                return self.end(EndReason::RemoteLeft, now);
            }

            SignalMessage::VideoStateChanged { is_video_on } => {
                if self.remote_media.apply_signal(is_video_on) {
                    effects.push(Effect::Notify(SessionNotice::RemoteVideoChanged {
                        visible: self.remote_media.video_visible(),
                    }));
                }
            }

            SignalMessage::SharedImage { image_ref } => match self.display.apply_remote_image(image_ref) {
                Ok(true) => self.push_display_notice(&mut effects),
                Ok(false) => {}
                Err(e) => tracing::warn!("Rejecting shared image from {}: {}", sender_id, e),
            },

            SignalMessage::RemoveImage => match self.display.apply_remote_removal() {
                Ok(true) => self.push_display_notice(&mut effects),
                Ok(false) => {}
                Err(e) => tracing::warn!("Rejecting image removal from {}: {}", sender_id, e),
            },

            SignalMessage::ChatMessage(message) => {
                self.chat.receive(message.clone());
                effects.push(Effect::Notify(SessionNotice::Chat { message }));
            }

            SignalMessage::Reaction { kind, sender } => {
                let event = self.reactions.add(kind, &sender, now);
                effects.push(Effect::Notify(SessionNotice::Reaction {
                    kind: event.kind,
                    sender: event.sender,
                }));
            }

            SignalMessage::CoinUpdate { balance } => {
                if let Some(ledger) = self.ledger.as_mut() {
                    ledger.record_wallet_push(balance);
                }
                effects.push(Effect::Notify(SessionNotice::WalletBalance { balance }));
            }

            // bereits oben als Whiteboard-Operation behandelt
            SignalMessage::WhiteboardStartPath(_)
            | SignalMessage::WhiteboardAddPoint(_)
            | SignalMessage::WhiteboardRemovePath(_)
            | SignalMessage::WhiteboardClearPage(_)
            | SignalMessage::WhiteboardAddPage(_)
            | SignalMessage::WhiteboardSwitchPage(_)
            | SignalMessage::WhiteboardScroll(_) => {}
        }

        self.after_transition(before, now, &mut effects);
        effects
    }

    /// Ereignis der Peer-Verbindung oder Ergebnis einer Peer-Aktion
    pub fn on_peer_event(&mut self, event: PeerEvent, now: Instant) -> Vec<Effect> {
        if self.is_ended() {
            return Vec::new();
        }

        let before = self.lifecycle.state();
        let mut effects = Vec::new();

        match event {
            PeerEvent::IceCandidate(candidate) => {
                effects.push(Effect::Signal(SignalMessage::IceCandidate { candidate }));
            }

            PeerEvent::OfferCreated(sdp) => {
                if self.lifecycle.on_local_offer_created() {
                    effects.push(Effect::Signal(SignalMessage::Offer { sdp }));
                }
            }

            PeerEvent::AnswerCreated(sdp) => {
                effects.push(Effect::Signal(SignalMessage::Answer { sdp }));
                for candidate in self.lifecycle.on_answer_created() {
                    effects.push(Effect::Peer(PeerAction::AddCandidate(candidate)));
                }
            }

            PeerEvent::AnswerApplied => {
                for candidate in self.lifecycle.on_answer_applied() {
                    effects.push(Effect::Peer(PeerAction::AddCandidate(candidate)));
                }
            }

            PeerEvent::NegotiationFailed(reason) => {
                tracing::error!("Negotiation failed: {}", reason);
                effects.push(Effect::Notify(SessionNotice::Error { message: reason }));
                match self.lifecycle.on_negotiation_failed() {
                    NegotiationOutcome::Restored => {
                        tracing::info!("Keeping existing link after failed negotiation");
                    }
                    NegotiationOutcome::Unrecoverable => {
                        effects.extend(self.end(EndReason::ConnectionLost, now));
                        return effects;
                    }
                    NegotiationOutcome::Ignored => {}
                }
            }

            PeerEvent::LinkState(LinkState::Connected) => {
                self.lifecycle.on_link_connected();
            }

            PeerEvent::LinkState(LinkState::Connecting) => {}

            PeerEvent::LinkState(LinkState::Disconnected) => {
                tracing::warn!("Peer link disconnected, waiting for recovery");
            }

            PeerEvent::LinkState(LinkState::Failed | LinkState::Closed) => {
                return self.end(EndReason::ConnectionLost, now);
            }

            PeerEvent::RemoteTrack(TrackKind::Audio) => {
                self.remote_media.set_audio_present();
                self.maybe_start_billing(now, &mut effects);
            }

            PeerEvent::RemoteTrack(TrackKind::Video) => {
                self.push_remote_video_hint(true, &mut effects);
            }

            PeerEvent::RemoteTrackMuted { kind, muted } => {
                if kind == TrackKind::Video {
                    self.push_remote_video_hint(!muted, &mut effects);
                }
            }

            PeerEvent::VideoAttached => {
                if self.video.is_enabled() {
                    self.renegotiate(&mut effects);
                }
            }

            PeerEvent::VideoAttachFailed(reason) => {
                tracing::error!("Failed to attach video: {}", reason);
                if self.video.disable(DisableReason::DeviceFailure) {
                    self.push_video_disabled(DisableReason::DeviceFailure, &mut effects);
                }
                effects.push(Effect::Notify(SessionNotice::Error { message: reason }));
            }

            PeerEvent::StatsSampled(stats) => self.on_stats(stats, &mut effects),
        }

        self.after_transition(before, now, &mut effects);
        effects
    }

    /// Tick eines Session-Timers
    pub fn tick(&mut self, kind: TimerKind, now: Instant) -> Vec<Effect> {
        if self.is_ended() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        match kind {
            TimerKind::Elapsed => {
                self.reactions.prune(now);
                if self.billing_started_at.is_some() {
                    let elapsed = self.elapsed_secs(now);
                    let exhausted = self.advance_ledger(elapsed, &mut effects);
                    if exhausted {
                        effects.extend(self.end(EndReason::BalanceExhausted, now));
                    }
                }
            }

            TimerKind::VideoCountdown => match self.video.tick(now) {
                VideoTick::Unchanged => {}
                VideoTick::WarningEntered { remaining } => {
                    tracing::info!("Video expires in {}s", remaining.as_secs());
                    effects.push(Effect::Notify(SessionNotice::VideoWarning {
                        remaining_secs: remaining.as_secs(),
                    }));
                }
                VideoTick::Disabled(reason) => self.push_video_disabled(reason, &mut effects),
            },

            TimerKind::NetworkSample => {
                if self.video.is_enabled() {
                    effects.push(Effect::Peer(PeerAction::SampleStats));
                }
            }
        }
        effects
    }

    /// Verlassen durch den lokalen Benutzer
    pub fn leave(&mut self, now: Instant) -> Vec<Effect> {
        self.end(EndReason::LocalLeave, now)
    }

    /// Beendet die Session genau einmal: Timer, Geräte, Peer, Signal, Buchung
    pub fn end(&mut self, reason: EndReason, now: Instant) -> Vec<Effect> {
        if !self.lifecycle.end() {
            return Vec::new();
        }

        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        tracing::info!("Session {} ended: {:?}", self.info.session_id, reason);

        let mut effects = vec![Effect::CancelAllTimers];

        if self.video.disable(DisableReason::Manual) {
            effects.push(Effect::ReleaseCamera);
        }
        effects.push(Effect::ReleaseDevices);
        effects.push(Effect::Peer(PeerAction::Close));

        // letzte angebrochene Abrechnung bis zum Ende
        let elapsed = self.elapsed_secs(now);
        if self.billing_started_at.is_some() {
            self.advance_ledger(elapsed, &mut effects);
        }

        let computed_minutes = self
            .ledger
            .as_ref()
            .map(CoinLedger::billed_minutes)
            .unwrap_or(elapsed / 60);

        if reason != EndReason::RelayDisconnected {
            effects.push(Effect::Signal(SignalMessage::EndCall {
                session_id: self.info.session_id.clone(),
                elapsed_seconds: elapsed,
                computed_minutes,
            }));
        }

        if !self.finalized {
            if let Some(ledger) = self.ledger.as_ref() {
                self.finalized = true;
                effects.push(Effect::Finalize(ledger.finalize_request(
                    &self.info.session_id,
                    &self.info.local.id,
                    elapsed,
                )));
            }
        }

        effects.push(Effect::Notify(SessionNotice::StateChanged {
            state: ConnectionState::Ended,
        }));
        effects.push(Effect::Notify(SessionNotice::Ended { reason }));
        effects
    }

    // ========================================================================
    // VIDEO
    // ========================================================================

    /// Prüft, ob Video eingeschaltet werden kann (vor dem Belegen der Kamera)
    pub fn ensure_video_available(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.lifecycle.link_established() {
            return Err(SessionError::VideoUnavailable(self.lifecycle.state()));
        }
        Ok(())
    }

    /// Schaltet Video ein oder erneuert den Countdown
    pub fn enable_video(&mut self, now: Instant) -> Outcome<VideoChange> {
        if !self.video.is_enabled() {
            self.ensure_video_available()?;
        }
        self.ensure_active()?;

        let change = self.video.enable(now);
        let policy = *self.video.policy();
        let mut effects = Vec::new();

        if change == VideoChange::Enabled {
            self.sampler.reset();
            effects.push(Effect::Peer(PeerAction::AttachVideo(policy.constraints)));
            effects.push(Effect::Signal(SignalMessage::VideoStateChanged { is_video_on: true }));
            effects.push(Effect::StartTimer {
                kind: TimerKind::VideoCountdown,
                period: COUNTDOWN_TICK,
            });
            effects.push(Effect::StartTimer {
                kind: TimerKind::NetworkSample,
                period: policy.sample_interval,
            });
            // Basislinie für das erste Messfenster
            effects.push(Effect::Peer(PeerAction::SampleStats));
        }

        effects.push(Effect::Notify(SessionNotice::VideoEnabled {
            renewed: change == VideoChange::Renewed,
            remaining_secs: policy.enable_window.as_secs(),
        }));
        Ok((change, effects))
    }

    pub fn disable_video(&mut self) -> Outcome<bool> {
        self.ensure_active()?;
        let mut effects = Vec::new();
        let disabled = self.video.disable(DisableReason::Manual);
        if disabled {
            self.push_video_disabled(DisableReason::Manual, &mut effects);
        }
        Ok((disabled, effects))
    }

    pub fn set_window_visible(&mut self, visible: bool) -> Outcome<()> {
        self.ensure_active()?;
        let mut effects = Vec::new();
        if let Some(reason) = self.video.set_window_visible(visible) {
            self.push_video_disabled(reason, &mut effects);
        }
        Ok(((), effects))
    }

    pub fn record_input_activity(&mut self, now: Instant) -> Outcome<()> {
        self.ensure_active()?;
        self.video.record_activity(now);
        Ok(((), Vec::new()))
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) -> Outcome<()> {
        self.ensure_active()?;
        tracing::debug!("Local audio {}", if enabled { "unmuted" } else { "muted" });
        self.video.set_audio_enabled(enabled);
        Ok(((), Vec::new()))
    }

    fn on_stats(&mut self, stats: InboundStats, effects: &mut Vec<Effect>) {
        if !self.video.is_enabled() {
            return;
        }
        let quality = self.sampler.record(stats);
        if let Some(reason) = self.video.on_network_quality(quality) {
            self.push_video_disabled(reason, effects);
        }
    }

    fn push_video_disabled(&mut self, reason: DisableReason, effects: &mut Vec<Effect>) {
        effects.push(Effect::StopTimer(TimerKind::VideoCountdown));
        effects.push(Effect::StopTimer(TimerKind::NetworkSample));
        effects.push(Effect::Peer(PeerAction::DetachVideo));
        effects.push(Effect::ReleaseCamera);
        effects.push(Effect::Signal(SignalMessage::VideoStateChanged { is_video_on: false }));
        effects.push(Effect::Notify(SessionNotice::VideoDisabled { reason }));
    }

    fn push_remote_video_hint(&mut self, live: bool, effects: &mut Vec<Effect>) {
        if self.remote_media.apply_track_hint(live) {
            effects.push(Effect::Notify(SessionNotice::RemoteVideoChanged {
                visible: self.remote_media.video_visible(),
            }));
        }
    }

    // ========================================================================
    // WHITEBOARD & DISPLAY
    // ========================================================================

    pub fn start_path(
        &mut self,
        tool: Tool,
        color: &str,
        size: f64,
        point: Point,
    ) -> Outcome<String> {
        self.ensure_active()?;
        let op = self.whiteboard.start_path(tool, color, size, point)?;
        let path_id = op.path_id.clone();
        Ok((path_id, self.broadcast_whiteboard(vec![WhiteboardOp::StartPath(op)])))
    }

    pub fn add_point(&mut self, path_id: &str, point: Point) -> Outcome<()> {
        self.ensure_active()?;
        let op = self.whiteboard.add_point(path_id, point)?;
        Ok(((), self.broadcast_whiteboard(vec![WhiteboardOp::AddPoint(op)])))
    }

    pub fn end_path(&mut self, path_id: &str) -> Outcome<()> {
        self.ensure_active()?;
        self.whiteboard.end_path(path_id)?;
        Ok(((), Vec::new()))
    }

    /// Radiert den obersten Strich unter dem Zeiger, gibt dessen ID zurück
    pub fn erase_at(&mut self, point: Point) -> Outcome<Option<String>> {
        self.ensure_active()?;
        match self.whiteboard.erase_at(point) {
            Some(op) => {
                let path_id = op.path_id.clone();
                Ok((
                    Some(path_id),
                    self.broadcast_whiteboard(vec![WhiteboardOp::RemovePath(op)]),
                ))
            }
            None => Ok((None, Vec::new())),
        }
    }

    pub fn remove_path(&mut self, path_id: &str) -> Outcome<()> {
        self.ensure_active()?;
        let op = self.whiteboard.remove_path(path_id)?;
        Ok(((), self.broadcast_whiteboard(vec![WhiteboardOp::RemovePath(op)])))
    }

    pub fn clear_page(&mut self, page_number: u32) -> Outcome<()> {
        self.ensure_active()?;
        let op = self.whiteboard.clear_page(page_number)?;
        Ok(((), self.broadcast_whiteboard(vec![WhiteboardOp::ClearPage(op)])))
    }

    /// Neue Seite, gibt deren Nummer zurück
    pub fn add_page(&mut self) -> Outcome<u32> {
        self.ensure_active()?;
        let ops = self.whiteboard.add_page()?;
        let page_number = self.whiteboard.current_page_number();
        Ok((page_number, self.broadcast_whiteboard(ops)))
    }

    pub fn switch_page(&mut self, page_number: u32) -> Outcome<()> {
        self.ensure_active()?;
        let op = self.whiteboard.switch_page(page_number)?;
        Ok(((), self.broadcast_whiteboard(vec![WhiteboardOp::SwitchPage(op)])))
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) -> Outcome<()> {
        self.ensure_active()?;
        let op = self.whiteboard.scroll_to(x, y);
        // Scroll ändert keine Inhalte, daher kein Hinweis
        Ok(((), vec![Effect::Signal(WhiteboardOp::ScrollTo(op).into())]))
    }

    pub fn share_image(&mut self, image_ref: &str) -> Outcome<()> {
        self.ensure_active()?;
        let image_ref = self.display.share_image(image_ref)?;
        let mut effects = vec![Effect::Signal(SignalMessage::SharedImage { image_ref })];
        self.push_display_notice(&mut effects);
        Ok(((), effects))
    }

    pub fn remove_image(&mut self) -> Outcome<bool> {
        self.ensure_active()?;
        let mut effects = Vec::new();
        let removed = self.display.remove_image()?;
        if removed {
            effects.push(Effect::Signal(SignalMessage::RemoveImage));
            self.push_display_notice(&mut effects);
        }
        Ok((removed, effects))
    }

    fn broadcast_whiteboard(&self, ops: Vec<WhiteboardOp>) -> Vec<Effect> {
        let mut effects: Vec<Effect> = ops
            .into_iter()
            .map(|op| Effect::Signal(op.into()))
            .collect();
        effects.push(Effect::Notify(SessionNotice::WhiteboardUpdated {
            page_number: self.whiteboard.current_page_number(),
        }));
        effects
    }

    fn apply_remote_whiteboard(&mut self, op: WhiteboardOp, effects: &mut Vec<Effect>) {
        match self.whiteboard.apply_remote(op) {
            Ok(true) => effects.push(Effect::Notify(SessionNotice::WhiteboardUpdated {
                page_number: self.whiteboard.current_page_number(),
            })),
            Ok(false) => {}
            Err(e) => tracing::warn!("Ignoring remote whiteboard operation: {}", e),
        }
    }

    fn push_display_notice(&self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Notify(SessionNotice::DisplayChanged {
            display: self.display.current().clone(),
        }));
    }

    // ========================================================================
    // CHAT & REACTIONS
    // ========================================================================

    pub fn send_chat(&mut self, text: &str) -> Outcome<ChatMessage> {
        self.ensure_active()?;
        let message = self.chat.compose(&self.info.local.id, text)?;
        let effects = vec![Effect::Signal(SignalMessage::ChatMessage(message.clone()))];
        Ok((message, effects))
    }

    pub fn react(&mut self, kind: ReactionKind, now: Instant) -> Outcome<ReactionEvent> {
        self.ensure_active()?;
        let event = self.reactions.add(kind, &self.info.local.id, now);
        let effects = vec![
            Effect::Signal(SignalMessage::Reaction {
                kind,
                sender: self.info.local.id.clone(),
            }),
            Effect::Notify(SessionNotice::Reaction {
                kind,
                sender: event.sender.clone(),
            }),
        ];
        Ok((event, effects))
    }

    // ========================================================================
    // BILLING
    // ========================================================================

    /// Startet die Uhr, sobald Link und beide Audiospuren stehen
    fn maybe_start_billing(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if self.billing_started_at.is_some()
            || self.lifecycle.state() != ConnectionState::Connected
            || !self.local_media_ready
            || !self.remote_media.audio_present()
        {
            return;
        }

        self.billing_started_at = Some(now);
        tracing::info!("Media connected on both sides, session clock started");

        if let Some(ledger) = self.ledger.as_ref() {
            effects.push(Effect::Notify(SessionNotice::BillingStarted {
                role: ledger.role(),
                denomination: ledger.denomination(),
                opening_balance: ledger.opening_balance(),
            }));
        }
    }

    /// Gibt `true` zurück, wenn das Guthaben gerade aufgebraucht wurde
    fn advance_ledger(&mut self, elapsed_secs: u64, effects: &mut Vec<Effect>) -> bool {
        let Some(ledger) = self.ledger.as_mut() else {
            return false;
        };

        let mut exhausted = false;
        for event in ledger.advance(elapsed_secs) {
            match event {
                LedgerEvent::Advanced { minute, running, .. } => {
                    effects.push(Effect::Notify(SessionNotice::LedgerTick { minute, running }));
                }
                LedgerEvent::LowBalance { remaining } => {
                    effects.push(Effect::Notify(SessionNotice::LowBalance { remaining }));
                }
                LedgerEvent::Exhausted => {
                    effects.push(Effect::Notify(SessionNotice::BalanceExhausted));
                    exhausted = true;
                }
            }
        }
        exhausted
    }

    // ========================================================================
    // STATE TRACKING
    // ========================================================================

    fn renegotiate(&mut self, effects: &mut Vec<Effect>) {
        match self.lifecycle.begin_renegotiation() {
            Ok(Renegotiation::Offer) => effects.push(Effect::Peer(PeerAction::CreateOffer)),
            Ok(Renegotiation::Request) => effects.push(Effect::Signal(SignalMessage::Renegotiate)),
            Ok(Renegotiation::Queued) => tracing::debug!("Renegotiation queued"),
            Err(e) => tracing::warn!("Cannot renegotiate: {}", e),
        }
    }

    fn after_transition(&mut self, before: ConnectionState, now: Instant, effects: &mut Vec<Effect>) {
        let after = self.lifecycle.state();
        if after == before || after == ConnectionState::Ended {
            return;
        }

        tracing::info!("Session {}: {} -> {}", self.info.session_id, before, after);
        effects.push(Effect::Notify(SessionNotice::StateChanged { state: after }));

        if after == ConnectionState::Connected {
            self.maybe_start_billing(now, effects);

            if self.lifecycle.take_queued_renegotiation() {
                effects.push(Effect::Peer(PeerAction::CreateOffer));
                effects.push(Effect::Notify(SessionNotice::StateChanged {
                    state: ConnectionState::Negotiating,
                }));
            }
        }
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    pub fn active_reactions(&self, now: Instant) -> Vec<&ReactionEvent> {
        self.reactions.active(now)
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.info.session_id.clone(),
            state: self.lifecycle.state(),
            local_media: self.video.local().clone(),
            video_phase: self.video.phase(now),
            remote_video_visible: self.remote_media.video_visible(),
            whiteboard: self.whiteboard.clone(),
            display: self.display.current().clone(),
            chat: self.chat.messages().to_vec(),
            active_reactions: self.reactions.active(now).iter().map(|e| e.kind).collect(),
            elapsed_secs: self.elapsed_secs(now),
            ledger: self.ledger.as_ref().map(LedgerSnapshot::from),
        }
    }

    pub fn summary(&self, now: Instant) -> SessionSummary {
        let ledger = self.ledger.as_ref().map(LedgerSnapshot::from);
        SessionSummary {
            session_id: self.info.session_id.clone(),
            end_reason: self.end_reason,
            elapsed_secs: self.elapsed_secs(now),
            billed_minutes: ledger.as_ref().map(|l| l.billed_minutes).unwrap_or(0),
            ledger,
            finalized: self.finalized,
            chat_messages: self.chat.len(),
            pages: self.whiteboard.page_count(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
