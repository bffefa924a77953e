// Integration test: two full sessions talking through an in-memory relay.
// Covers join, offer/answer, billing over time, video expiry, whiteboard
// replication and teardown with exactly one finalization per participant.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use coincall::billing::{InMemoryWallet, WalletService};
use coincall::call_engine::{
    DeviceError, InboundStats, LinkState, MediaDevices, PeerError, PeerEvent, PeerTransport,
    TrackKind, VideoChange, VideoConstraints, VideoPhase, VideoPolicy, VirtualDevices,
};
use coincall::session::{
    start_session, ConnectionState, Denomination, EndReason, ParticipantRef, Role, SessionDeps,
    SessionError, SessionHandle, SessionInfo, SessionNotice,
};
use coincall::signaling::{RelayEnvelope, RelayEvent, SignalMessage, SignalSink, SignalingError};
use coincall::whiteboard::{Point, Tool};

const SESSION_ID: &str = "session-1";

// ============================================================================
// LOOPBACK RELAY
// ============================================================================

#[derive(Default)]
struct Hub {
    joined: HashSet<String>,
    routes: HashMap<String, mpsc::UnboundedSender<RelayEvent>>,
}

/// Relay im Speicher: leitet an den jeweils anderen Teilnehmer weiter
#[derive(Clone, Default)]
struct LoopbackRelay {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackRelay {
    fn attach(&self, participant_id: &str) -> (RelaySink, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.lock().routes.insert(participant_id.to_string(), tx);
        (
            RelaySink {
                hub: Arc::clone(&self.hub),
                participant_id: participant_id.to_string(),
            },
            rx,
        )
    }
}

struct RelaySink {
    hub: Arc<Mutex<Hub>>,
    participant_id: String,
}

impl SignalSink for RelaySink {
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        // über die Leitung wie beim echten Relay
        let envelope = RelayEnvelope::new(SESSION_ID, &self.participant_id, message);
        let wire = serde_json::to_string(&envelope).unwrap();
        let envelope: RelayEnvelope = serde_json::from_str(&wire).unwrap();

        let mut hub = self.hub.lock();
        if let SignalMessage::JoinSession { .. } = envelope.message {
            hub.joined.insert(envelope.sender_id.clone());
            if hub.joined.len() == 2 {
                for route in hub.routes.values() {
                    let _ = route.send(RelayEvent::Message {
                        sender_id: "relay".to_string(),
                        message: SignalMessage::PeerJoined,
                    });
                }
            }
            return Ok(());
        }

        for (id, route) in hub.routes.iter() {
            if *id != envelope.sender_id {
                let _ = route.send(RelayEvent::Message {
                    sender_id: envelope.sender_id.clone(),
                    message: envelope.message.clone(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// FAKE PEER TRANSPORT
// ============================================================================

struct FakeTransport {
    name: String,
    events: mpsc::UnboundedSender<PeerEvent>,
    candidates: Mutex<Vec<String>>,
    /// Eigenes Offer gesetzt, Answer steht aus (have-local-offer)
    local_offer: Mutex<bool>,
    offers_created: Mutex<usize>,
    video_attached: Mutex<bool>,
    closed: Mutex<bool>,
}

impl FakeTransport {
    fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                name: name.to_string(),
                events: tx,
                candidates: Mutex::new(Vec::new()),
                local_offer: Mutex::new(false),
                offers_created: Mutex::new(0),
                video_attached: Mutex::new(false),
                closed: Mutex::new(false),
            }),
            rx,
        )
    }

    fn link_up(&self) {
        let _ = self
            .events
            .send(PeerEvent::IceCandidate(format!("candidate-{}", self.name)));
        let _ = self.events.send(PeerEvent::LinkState(LinkState::Connected));
        let _ = self.events.send(PeerEvent::RemoteTrack(TrackKind::Audio));
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&self) -> Result<String, PeerError> {
        *self.local_offer.lock() = true;
        *self.offers_created.lock() += 1;
        Ok(format!("offer-{}", self.name))
    }

    async fn accept_offer(&self, sdp: String) -> Result<String, PeerError> {
        assert!(sdp.starts_with("offer-"));
        if *self.local_offer.lock() {
            return Err(PeerError::OfferCollision);
        }
        self.link_up();
        Ok(format!("answer-{}", self.name))
    }

    async fn apply_answer(&self, sdp: String) -> Result<(), PeerError> {
        assert!(sdp.starts_with("answer-"));
        *self.local_offer.lock() = false;
        self.link_up();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<(), PeerError> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn attach_video(&self, _constraints: VideoConstraints) -> Result<(), PeerError> {
        *self.video_attached.lock() = true;
        Ok(())
    }

    async fn detach_video(&self) -> Result<(), PeerError> {
        *self.video_attached.lock() = false;
        Ok(())
    }

    async fn inbound_stats(&self) -> Result<InboundStats, PeerError> {
        Ok(InboundStats::default())
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

// ============================================================================
// HELPERS
// ============================================================================

struct Participant {
    handle: SessionHandle,
    notices: broadcast::Receiver<SessionNotice>,
    transport: Arc<FakeTransport>,
    devices: Arc<VirtualDevices>,
}

fn session_info(local: &str, remote: &str, role: Role) -> SessionInfo {
    SessionInfo {
        session_id: SESSION_ID.to_string(),
        local: ParticipantRef::new(local, local),
        remote: ParticipantRef::new(remote, remote),
        role,
        denomination: Some(Denomination::Bronze),
        scheduled_start: None,
        scheduled_minutes: None,
    }
}

async fn join(
    relay: &LoopbackRelay,
    wallet: Arc<InMemoryWallet>,
    local: &str,
    remote: &str,
    role: Role,
) -> Participant {
    let (sink, relay_events) = relay.attach(local);
    let (transport, peer_events) = FakeTransport::new(local);
    let devices = Arc::new(VirtualDevices::available());

    let deps = SessionDeps {
        transport: Arc::clone(&transport) as Arc<dyn PeerTransport>,
        peer_events,
        signals: Arc::new(sink),
        relay_events,
        devices: Arc::clone(&devices) as Arc<dyn MediaDevices>,
        wallet: wallet as Arc<dyn WalletService>,
    };

    let (handle, notices) = start_session(session_info(local, remote, role), VideoPolicy::default(), deps)
        .await
        .unwrap();

    Participant {
        handle,
        notices,
        transport,
        devices,
    }
}

/// Alice zahlt (100 Bronze), Bob verdient (0 Bronze)
async fn connected_pair(wallet: Arc<InMemoryWallet>) -> (Participant, Participant) {
    let relay = LoopbackRelay::default();
    let alice = join(&relay, Arc::clone(&wallet), "alice", "bob", Role::Payer).await;
    let bob = join(&relay, wallet, "bob", "alice", Role::Earner).await;

    settle().await;
    (alice, bob)
}

fn bronze_wallet() -> Arc<InMemoryWallet> {
    Arc::new(
        InMemoryWallet::new()
            .with_balance("alice", Denomination::Bronze, 100.0)
            .with_balance("bob", Denomination::Bronze, 0.0),
    )
}

/// Lässt alle bereiten Tasks laufen
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn drain(notices: &mut broadcast::Receiver<SessionNotice>) -> Vec<SessionNotice> {
    let mut out = Vec::new();
    loop {
        match notices.try_recv() {
            Ok(notice) => out.push(notice),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_both_sides_connect_and_bill_per_minute() {
    let (alice, bob) = connected_pair(bronze_wallet()).await;

    let snapshot = alice.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(bob.handle.snapshot().await.unwrap().state, ConnectionState::Connected);

    // Candidates des Peers wurden genau einmal angewendet
    assert_eq!(*alice.transport.candidates.lock(), vec!["candidate-bob".to_string()]);
    assert_eq!(*bob.transport.candidates.lock(), vec!["candidate-alice".to_string()]);

    tokio::time::sleep(Duration::from_millis(180_500)).await;

    let payer = alice.handle.snapshot().await.unwrap().ledger.unwrap();
    assert_eq!(payer.billed_minutes, 3);
    assert_eq!(payer.running, 88.0);

    let earner = bob.handle.snapshot().await.unwrap().ledger.unwrap();
    assert_eq!(earner.billed_minutes, 3);
    assert_eq!(earner.running, 9.0);
}

#[tokio::test(start_paused = true)]
async fn test_leave_ends_both_sides_and_finalizes_once() {
    let wallet = bronze_wallet();
    let (alice, bob) = connected_pair(Arc::clone(&wallet)).await;

    tokio::time::sleep(Duration::from_secs(125)).await;
    alice.handle.leave().await;
    // zweites Verlassen ist wirkungslos
    alice.handle.leave().await;

    let alice_summary = alice.handle.finished().await.unwrap();
    let bob_summary = bob.handle.finished().await.unwrap();

    assert_eq!(alice_summary.end_reason, Some(EndReason::LocalLeave));
    assert_eq!(bob_summary.end_reason, Some(EndReason::RemoteLeft));
    assert_eq!(alice_summary.billed_minutes, 2);
    assert!(alice_summary.finalized && bob_summary.finalized);

    let transactions = wallet.transactions();
    assert_eq!(transactions.len(), 2);

    let payer = transactions
        .iter()
        .find(|t| t.request.participant_id == "alice")
        .unwrap();
    assert_eq!(payer.request.amount, 8.0);
    assert_eq!(payer.request.balance_after, 92.0);

    let earner = transactions
        .iter()
        .find(|t| t.request.participant_id == "bob")
        .unwrap();
    assert_eq!(earner.request.amount, 6.0);

    assert_eq!(wallet.balance("alice", Denomination::Bronze).await.unwrap(), 92.0);
    assert!(*alice.transport.closed.lock());
    assert!(!alice.devices.microphone_held());
    assert!(!bob.devices.microphone_held());
}

#[tokio::test(start_paused = true)]
async fn test_missing_microphone_blocks_join() {
    let relay = LoopbackRelay::default();
    let (sink, relay_events) = relay.attach("alice");
    let (transport, peer_events) = FakeTransport::new("alice");

    let deps = SessionDeps {
        transport,
        peer_events,
        signals: Arc::new(sink),
        relay_events,
        devices: Arc::new(VirtualDevices::without_microphone()),
        wallet: bronze_wallet(),
    };

    let result = start_session(
        session_info("alice", "bob", Role::Payer),
        VideoPolicy::default(),
        deps,
    )
    .await;

    assert!(matches!(
        result,
        Err(SessionError::Device(DeviceError::NoInputDevice))
    ));
    assert!(relay.hub.lock().joined.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_whiteboard_strokes_replicate() {
    let (alice, bob) = connected_pair(bronze_wallet()).await;

    let path_id = alice
        .handle
        .start_path(Tool::Pen, "#222222", 3.0, Point::new(10.0, 10.0))
        .await
        .unwrap();
    alice.handle.add_point(&path_id, Point::new(20.0, 10.0)).await.unwrap();
    alice.handle.add_point(&path_id, Point::new(30.0, 10.0)).await.unwrap();
    alice.handle.end_path(&path_id).await.unwrap();
    settle().await;

    let board = bob.handle.snapshot().await.unwrap().whiteboard;
    let stroke = board.stroke(&path_id).unwrap();
    assert_eq!(stroke.points.len(), 3);
    assert_eq!(stroke.color, "#222222");

    // Bob radiert den Strich, Alice sieht es
    let erased = bob.handle.erase_at(Point::new(20.0, 12.0)).await.unwrap();
    assert_eq!(erased.as_deref(), Some(path_id.as_str()));

    let page = bob.handle.add_page().await.unwrap();
    assert_eq!(page, 2);
    settle().await;

    let board = alice.handle.snapshot().await.unwrap().whiteboard;
    assert!(board.stroke(&path_id).is_none());
    assert_eq!(board.page_count(), 2);
    assert_eq!(board.current_page_number(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_video_expires_after_window() {
    let (mut alice, bob) = connected_pair(bronze_wallet()).await;

    assert_eq!(alice.handle.enable_video().await.unwrap(), VideoChange::Enabled);
    assert!(*alice.transport.video_attached.lock());
    assert!(alice.devices.camera_held());
    settle().await;
    assert!(bob.handle.snapshot().await.unwrap().remote_video_visible);

    // Eingabe alle 10 s hält die Idle-Grenze fern, verlängert aber nicht
    for _ in 0..11 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        alice.handle.record_input_activity().await.unwrap();
    }
    assert!(alice.handle.snapshot().await.unwrap().local_media.video_enabled);

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let snapshot = alice.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.video_phase, VideoPhase::Off);
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert!(!alice.devices.camera_held());
    assert!(!bob.handle.snapshot().await.unwrap().remote_video_visible);

    let notices = drain(&mut alice.notices);
    assert!(notices
        .iter()
        .any(|n| matches!(n, SessionNotice::VideoWarning { .. })));
    assert!(notices.iter().any(|n| matches!(
        n,
        SessionNotice::VideoDisabled {
            reason: coincall::call_engine::DisableReason::Expired
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_answerer_video_renegotiates_through_offerer() {
    let (mut alice, mut bob) = connected_pair(bronze_wallet()).await;
    assert_eq!(*alice.transport.offers_created.lock(), 1);
    drain(&mut alice.notices);
    drain(&mut bob.notices);

    assert_eq!(bob.handle.enable_video().await.unwrap(), VideoChange::Enabled);
    assert!(*bob.transport.video_attached.lock());
    settle().await;

    // Bob bittet um ein Offer, nur Alice erstellt eines
    assert_eq!(*alice.transport.offers_created.lock(), 2);
    assert_eq!(*bob.transport.offers_created.lock(), 0);
    assert!(!*alice.transport.local_offer.lock());

    assert_eq!(alice.handle.snapshot().await.unwrap().state, ConnectionState::Connected);
    assert_eq!(bob.handle.snapshot().await.unwrap().state, ConnectionState::Connected);
    assert!(alice.handle.snapshot().await.unwrap().remote_video_visible);

    let errors = drain(&mut bob.notices)
        .into_iter()
        .chain(drain(&mut alice.notices))
        .filter(|n| matches!(n, SessionNotice::Error { .. }))
        .count();
    assert_eq!(errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_chat_and_reactions_reach_peer() {
    let (alice, mut bob) = connected_pair(bronze_wallet()).await;
    drain(&mut bob.notices);

    alice.handle.send_chat("Hallo Bob").await.unwrap();
    alice
        .handle
        .react(coincall::chat::ReactionKind::Clap)
        .await
        .unwrap();
    settle().await;

    let snapshot = bob.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.chat.len(), 1);
    assert_eq!(snapshot.chat[0].sender, "alice");
    assert_eq!(snapshot.active_reactions.len(), 1);

    let notices = drain(&mut bob.notices);
    assert!(notices
        .iter()
        .any(|n| matches!(n, SessionNotice::Chat { message } if message.text == "Hallo Bob")));

    assert_eq!(
        alice.handle.send_chat("   ").await.unwrap_err(),
        SessionError::Chat(coincall::chat::ChatError::Empty)
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(bob.handle.snapshot().await.unwrap().active_reactions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_video_rejected_before_connection() {
    let relay = LoopbackRelay::default();
    let alice = join(&relay, bronze_wallet(), "alice", "bob", Role::Payer).await;
    settle().await;

    assert_eq!(
        alice.handle.enable_video().await.unwrap_err(),
        SessionError::VideoUnavailable(ConnectionState::Joining)
    );
    assert!(!alice.devices.camera_held());
}
