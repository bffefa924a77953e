//! WebRTC Peer-Verbindung
//!
//! `PeerTransport` ist die Schnittstelle, über die die Session Offer/Answer,
//! ICE Candidates und den Video-Track steuert. `WebRtcPeer` setzt sie mit
//! webrtc-rs um. Asynchrone Rückmeldungen der Verbindung (Candidates,
//! Statuswechsel, eingehende Tracks) kommen als `PeerEvent` über einen Kanal.

use super::quality::InboundStats;
use super::video::VideoConstraints;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::stats::StatsReportType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

/// Audio Sample Rate (48kHz, Opus)
pub const AUDIO_CLOCK_RATE: u32 = 48000;

/// RTP Clock Rate für Video
pub const VIDEO_CLOCK_RATE: u32 = 90000;

const STREAM_ID: &str = "coincall";

/// Ohne RTP-Pakete gilt ein Remote Track nach dieser Zeit als stumm
pub const TRACK_SILENCE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("WebRTC error: {0}")]
    WebRTC(String),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("Offer collision: local offer still pending")]
    OfferCollision,

    #[error("Peer connection closed")]
    Closed,
}

// ============================================================================
// PEER EVENTS
// ============================================================================

/// Zustand der Peer-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Rückmeldungen der Peer-Verbindung und Ergebnisse ausgeführter Aktionen
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Lokaler ICE Candidate gefunden (JSON)
    IceCandidate(String),
    LinkState(LinkState),
    /// Remote Track eingetroffen
    RemoteTrack(TrackKind),
    /// Remote Track liefert keine Pakete mehr bzw. wieder (nur Hinweis)
    RemoteTrackMuted { kind: TrackKind, muted: bool },
    OfferCreated(String),
    AnswerCreated(String),
    AnswerApplied,
    VideoAttached,
    VideoAttachFailed(String),
    StatsSampled(InboundStats),
    NegotiationFailed(String),
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Erstellt ein Offer und setzt es als Local Description
    async fn create_offer(&self) -> Result<String, PeerError>;

    /// Setzt das Remote Offer und gibt das Answer-SDP zurück.
    ///
    /// Mit eigenem ausstehendem Offer schlägt der Aufruf mit
    /// `PeerError::OfferCollision` fehl, ohne die Verbindung zu verändern.
    async fn accept_offer(&self, sdp: String) -> Result<String, PeerError>;

    async fn apply_answer(&self, sdp: String) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: String) -> Result<(), PeerError>;

    /// Hängt einen Video-Track an (danach ist eine Renegotiation nötig)
    async fn attach_video(&self, constraints: VideoConstraints) -> Result<(), PeerError>;

    /// Entfernt den Video-Beitrag, die Verbindung bleibt bestehen
    async fn detach_video(&self) -> Result<(), PeerError>;

    async fn inbound_stats(&self) -> Result<InboundStats, PeerError>;

    async fn close(&self);
}

// ============================================================================
// TRACK SILENCE
// ============================================================================

/// Leitet Mute-Hinweise aus dem Paketfluss eines Remote Tracks ab.
/// Meldet nur Wechsel.
#[derive(Debug)]
struct TrackSilence {
    kind: TrackKind,
    muted: bool,
}

impl TrackSilence {
    fn new(kind: TrackKind) -> Self {
        Self { kind, muted: false }
    }

    fn on_packet(&mut self) -> Option<PeerEvent> {
        self.set_muted(false)
    }

    fn on_silence(&mut self) -> Option<PeerEvent> {
        self.set_muted(true)
    }

    fn set_muted(&mut self, muted: bool) -> Option<PeerEvent> {
        if self.muted == muted {
            return None;
        }
        self.muted = muted;
        Some(PeerEvent::RemoteTrackMuted {
            kind: self.kind,
            muted,
        })
    }
}

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Standard STUN Server Konfiguration
pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
            "stun:stun2.l.google.com:19302".to_string(),
        ],
        ..Default::default()
    }]
}

// ============================================================================
// WEBRTC PEER
// ============================================================================

/// Peer-Verbindung über webrtc-rs
pub struct WebRtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
    video_sender: Mutex<Option<Arc<RTCRtpSender>>>,
}

impl WebRtcPeer {
    /// Baut die Peer Connection auf und hängt den Audio-Track an
    pub async fn connect(
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self, PeerError> {
        let pc = Self::create_peer_connection(ice_servers).await?;
        Self::setup_peer_connection_handlers(&pc, events);

        let audio_track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: AUDIO_CLOCK_RATE,
                channels: 1,
                ..Default::default()
            },
            "audio".to_string(),
            STREAM_ID.to_string(),
        ));

        pc.add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        Ok(Self {
            peer_connection: pc,
            video_sender: Mutex::new(None),
        })
    }

    async fn create_peer_connection(
        ice_servers: Vec<RTCIceServer>,
    ) -> Result<Arc<RTCPeerConnection>, PeerError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        Ok(Arc::new(pc))
    }

    fn setup_peer_connection_handlers(
        pc: &Arc<RTCPeerConnection>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) {
        let events_clone = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", s);

            let link_state = match s {
                RTCPeerConnectionState::Connected => Some(LinkState::Connected),
                RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
                RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
                RTCPeerConnectionState::Failed => Some(LinkState::Failed),
                RTCPeerConnectionState::Closed => Some(LinkState::Closed),
                _ => None,
            };

            if let Some(link_state) = link_state {
                let _ = events_clone.send(PeerEvent::LinkState(link_state));
            }

            Box::pin(async {})
        }));

        let events_clone = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            if let Some(c) = candidate {
                match c.to_json() {
                    Ok(json) => {
                        if let Ok(candidate_str) = serde_json::to_string(&json) {
                            let _ = events_clone.send(PeerEvent::IceCandidate(candidate_str));
                        }
                    }
                    Err(e) => tracing::warn!("Failed to serialize ICE candidate: {}", e),
                }
            }
            Box::pin(async {})
        }));

        pc.on_track(Box::new(move |track, _, _| {
            let kind = match track.kind() {
                RTPCodecType::Video => TrackKind::Video,
                _ => TrackKind::Audio,
            };
            tracing::info!("Received remote {:?} track: {:?}", kind, track.codec());
            let _ = events.send(PeerEvent::RemoteTrack(kind));

            // RTP lesen und Stille als Mute-Hinweis melden
            let events = events.clone();
            tokio::spawn(async move {
                let mut silence = TrackSilence::new(kind);
                loop {
                    let hint = match tokio::time::timeout(TRACK_SILENCE_TIMEOUT, track.read_rtp()).await {
                        Ok(Ok(_)) => silence.on_packet(),
                        Ok(Err(e)) => {
                            tracing::debug!("Remote {:?} track ended: {}", kind, e);
                            if let Some(hint) = silence.on_silence() {
                                let _ = events.send(hint);
                            }
                            break;
                        }
                        Err(_) => silence.on_silence(),
                    };
                    if let Some(hint) = hint {
                        let _ = events.send(hint);
                    }
                }
            });

            Box::pin(async {})
        }));
    }

    async fn video_transceiver(&self) -> Option<Arc<RTCRtpTransceiver>> {
        self.peer_connection
            .get_transceivers()
            .await
            .into_iter()
            .find(|t| t.kind() == RTPCodecType::Video)
    }

    /// Jedes Offer trägt eine Video-Section, damit auch der Answerer später
    /// Video senden kann, ohne selbst ein Offer zu erstellen
    async fn ensure_video_section(&self) -> Result<(), PeerError> {
        if self.video_transceiver().await.is_some() {
            return Ok(());
        }

        self.peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;
        Ok(())
    }

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.peer_connection.signaling_state()
    }

    fn video_track(constraints: &VideoConstraints) -> Arc<TrackLocalStaticRTP> {
        tracing::debug!(
            "Creating video track {}x{}@{}fps, max {} bps",
            constraints.width,
            constraints.height,
            constraints.frame_rate,
            constraints.max_bitrate_bps
        );
        Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: VIDEO_CLOCK_RATE,
                ..Default::default()
            },
            "video".to_string(),
            STREAM_ID.to_string(),
        ))
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn create_offer(&self) -> Result<String, PeerError> {
        self.ensure_video_section().await?;

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: String) -> Result<String, PeerError> {
        // webrtc-rs kann have-local-offer nicht zurückrollen
        if self.peer_connection.signaling_state() == RTCSignalingState::HaveLocalOffer {
            return Err(PeerError::OfferCollision);
        }

        let offer =
            RTCSessionDescription::offer(sdp).map_err(|e| PeerError::InvalidSdp(e.to_string()))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<(), PeerError> {
        let answer =
            RTCSessionDescription::answer(sdp).map_err(|e| PeerError::InvalidSdp(e.to_string()))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<(), PeerError> {
        let candidate: RTCIceCandidateInit = serde_json::from_str(&candidate)
            .map_err(|e| PeerError::InvalidCandidate(e.to_string()))?;

        self.peer_connection
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))
    }

    async fn attach_video(&self, constraints: VideoConstraints) -> Result<(), PeerError> {
        let track = Self::video_track(&constraints) as Arc<dyn TrackLocal + Send + Sync>;

        let existing = self.video_sender.lock().clone();
        if let Some(sender) = existing {
            return sender
                .replace_track(Some(track))
                .await
                .map_err(|e| PeerError::WebRTC(e.to_string()));
        }

        // bereits verhandelte Video-Section weiterverwenden
        let sender = match self.video_transceiver().await {
            Some(transceiver) => {
                let sender = transceiver.sender().await;
                sender
                    .replace_track(Some(track))
                    .await
                    .map_err(|e| PeerError::WebRTC(e.to_string()))?;

                let direction = transceiver.direction();
                if !direction.has_send() {
                    transceiver
                        .set_direction(RTCRtpTransceiverDirection::from_send_recv(
                            true,
                            direction.has_recv(),
                        ))
                        .await;
                }
                sender
            }
            None => self
                .peer_connection
                .add_track(track)
                .await
                .map_err(|e| PeerError::WebRTC(e.to_string()))?,
        };

        *self.video_sender.lock() = Some(sender);
        Ok(())
    }

    async fn detach_video(&self) -> Result<(), PeerError> {
        let sender = self.video_sender.lock().clone();
        match sender {
            Some(sender) => sender
                .replace_track(None)
                .await
                .map_err(|e| PeerError::WebRTC(e.to_string())),
            None => Ok(()),
        }
    }

    async fn inbound_stats(&self) -> Result<InboundStats, PeerError> {
        let report = self.peer_connection.get_stats().await;

        // NACKs als Näherung für verlorene Pakete auf der Empfangsseite
        let stats = report
            .reports
            .values()
            .filter_map(|entry| match entry {
                StatsReportType::InboundRTP(inbound) => Some(InboundStats {
                    packets_received: inbound.packets_received,
                    packets_lost: inbound.nack_count,
                }),
                _ => None,
            })
            .fold(InboundStats::default(), |acc, s| InboundStats {
                packets_received: acc.packets_received + s.packets_received,
                packets_lost: acc.packets_lost + s.packets_lost,
            });

        Ok(stats)
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            tracing::warn!("Failed to close peer connection: {}", e);
        }
    }
}

impl std::fmt::Debug for WebRtcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcPeer")
            .field("state", &self.peer_connection.connection_state())
            .field("has_video", &self.video_sender.lock().is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn peer() -> WebRtcPeer {
        let (events, _) = mpsc::unbounded_channel();
        WebRtcPeer::connect(Vec::new(), events).await.unwrap()
    }

    #[test]
    fn test_track_silence_reports_changes_only() {
        let mut silence = TrackSilence::new(TrackKind::Video);
        assert_eq!(silence.on_packet(), None);
        assert_eq!(
            silence.on_silence(),
            Some(PeerEvent::RemoteTrackMuted {
                kind: TrackKind::Video,
                muted: true
            })
        );
        assert_eq!(silence.on_silence(), None);
        assert_eq!(
            silence.on_packet(),
            Some(PeerEvent::RemoteTrackMuted {
                kind: TrackKind::Video,
                muted: false
            })
        );
    }

    #[tokio::test]
    async fn test_offer_collision_keeps_local_offer() {
        let alice = peer().await;
        let bob = peer().await;

        let offer_alice = alice.create_offer().await.unwrap();
        bob.create_offer().await.unwrap();

        let result = bob.accept_offer(offer_alice).await;
        assert_eq!(result, Err(PeerError::OfferCollision));
        assert_eq!(bob.signaling_state(), RTCSignalingState::HaveLocalOffer);

        alice.close().await;
        bob.close().await;
    }

    #[tokio::test]
    async fn test_answerer_video_rides_on_offerer_renegotiation() {
        let alice = peer().await;
        let bob = peer().await;

        let offer = alice.create_offer().await.unwrap();
        assert!(offer.contains("m=video"));
        let answer = bob.accept_offer(offer).await.unwrap();
        alice.apply_answer(answer).await.unwrap();
        assert_eq!(bob.signaling_state(), RTCSignalingState::Stable);

        bob.attach_video(VideoConstraints::default()).await.unwrap();
        let transceiver = bob.video_transceiver().await.unwrap();
        assert!(transceiver.direction().has_send());

        // nur der Offerer verhandelt neu
        let offer = alice.create_offer().await.unwrap();
        let answer = bob.accept_offer(offer).await.unwrap();
        alice.apply_answer(answer).await.unwrap();

        assert_eq!(alice.signaling_state(), RTCSignalingState::Stable);
        assert_eq!(bob.signaling_state(), RTCSignalingState::Stable);
        assert_eq!(alice.peer_connection.get_transceivers().await.len(), 2);

        alice.close().await;
        bob.close().await;
    }
}
