//! Call Engine Module - WebRTC und Medien
//!
//! Dieses Modul verwaltet:
//! - die WebRTC Peer Connection
//! - lokale Mediengeräte
//! - den adaptiven Video-Controller und die Netzqualität

mod devices;
mod engine;
mod quality;
mod video;

#[cfg(feature = "native-audio")]
pub use devices::CpalDevices;
pub use devices::{DeviceError, MediaDevices, VirtualDevices};
pub use engine::{
    default_ice_servers, LinkState, PeerError, PeerEvent, PeerTransport, TrackKind, WebRtcPeer,
    AUDIO_CLOCK_RATE, VIDEO_CLOCK_RATE,
};
pub use quality::{InboundStats, NetworkQualitySampler};
pub use video::{
    DisableReason, NetworkQuality, ParticipantMediaState, RemoteMediaMirror, VideoChange,
    VideoConstraints, VideoController, VideoPhase, VideoPolicy, VideoTick,
};
