//! Session-Runner: führt eine `CallSession` als Task aus
//!
//! Der Runner besitzt die Session allein. Befehle der Oberfläche, Relay- und
//! Peer-Ereignisse sowie Timer-Ticks kommen über Kanäle herein, die Effekte
//! der Session werden der Reihe nach ausgeführt.

use super::call::{CallSession, Outcome, SessionError, SessionSnapshot, SessionSummary};
use super::effects::{Effect, EndReason, PeerAction, SessionNotice};
use super::timers::{TimerKind, TimerSet};
use super::types::SessionInfo;
use crate::billing::WalletService;
use crate::call_engine::{MediaDevices, PeerEvent, PeerTransport, VideoChange, VideoPolicy};
use crate::chat::{ChatMessage, ReactionEvent, ReactionKind};
use crate::signaling::{RelayEvent, SignalSink};
use crate::whiteboard::{Point, Tool};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Puffer für Hinweise an die Oberfläche
const NOTICE_CAPACITY: usize = 256;

/// Puffer für Befehle an den Runner
const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

// ============================================================================
// DEPENDENCIES
// ============================================================================

/// Externe Anbindungen einer Session
pub struct SessionDeps {
    pub transport: Arc<dyn PeerTransport>,
    pub peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    pub signals: Arc<dyn SignalSink>,
    pub relay_events: mpsc::UnboundedReceiver<RelayEvent>,
    pub devices: Arc<dyn MediaDevices>,
    pub wallet: Arc<dyn WalletService>,
}

// ============================================================================
// COMMANDS
// ============================================================================

enum Command {
    EnableVideo(Reply<VideoChange>),
    DisableVideo(Reply<bool>),
    SetWindowVisible(bool, Reply<()>),
    RecordInputActivity(Reply<()>),
    SetAudioEnabled(bool, Reply<()>),
    StartPath {
        tool: Tool,
        color: String,
        size: f64,
        point: Point,
        reply: Reply<String>,
    },
    AddPoint {
        path_id: String,
        point: Point,
        reply: Reply<()>,
    },
    EndPath {
        path_id: String,
        reply: Reply<()>,
    },
    EraseAt {
        point: Point,
        reply: Reply<Option<String>>,
    },
    RemovePath {
        path_id: String,
        reply: Reply<()>,
    },
    ClearPage {
        page_number: u32,
        reply: Reply<()>,
    },
    AddPage(Reply<u32>),
    SwitchPage {
        page_number: u32,
        reply: Reply<()>,
    },
    ScrollTo {
        x: f64,
        y: f64,
        reply: Reply<()>,
    },
    ShareImage {
        image_ref: String,
        reply: Reply<()>,
    },
    RemoveImage(Reply<bool>),
    SendChat {
        text: String,
        reply: Reply<ChatMessage>,
    },
    React {
        kind: ReactionKind,
        reply: Reply<ReactionEvent>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Leave(oneshot::Sender<()>),
}

// ============================================================================
// START
// ============================================================================

/// Belegt das Mikrofon, liest den Kontostand und tritt der Session bei
pub async fn start_session(
    info: SessionInfo,
    policy: VideoPolicy,
    deps: SessionDeps,
) -> Result<(SessionHandle, broadcast::Receiver<SessionNotice>), SessionError> {
    let SessionDeps {
        transport,
        peer_events,
        signals,
        relay_events,
        devices,
        wallet,
    } = deps;

    if let Err(e) = devices.acquire_microphone() {
        tracing::error!("Cannot join session {}: {}", info.session_id, e);
        return Err(e.into());
    }

    let opening_balance = match info.billing() {
        Some((role, denomination)) => match wallet.balance(&info.local.id, denomination).await {
            Ok(balance) => {
                tracing::info!("Opening balance for {}: {} {}", role, balance, denomination);
                balance
            }
            Err(e) => {
                tracing::error!("Failed to read wallet balance: {}", e);
                devices.release_all();
                return Err(e.into());
            }
        },
        None => 0.0,
    };

    let session_id = info.session_id.clone();
    let mut session = CallSession::new(info, policy, opening_balance, Instant::now());
    let join_effects = match session.join() {
        Ok(effects) => effects,
        Err(e) => {
            devices.release_all();
            return Err(e);
        }
    };

    let (notice_tx, notice_rx) = broadcast::channel(NOTICE_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let runner = SessionRunner {
        session,
        transport,
        peer_events,
        signals,
        relay_events,
        devices,
        wallet,
        timers: TimerSet::new(timer_tx),
        timer_ticks: timer_rx,
        notices: notice_tx.clone(),
    };

    let task = tokio::spawn(runner.run(command_rx, join_effects));

    Ok((
        SessionHandle {
            session_id,
            commands: command_tx,
            notices: notice_tx,
            task,
        },
        notice_rx,
    ))
}

// ============================================================================
// RUNNER
// ============================================================================

struct SessionRunner {
    session: CallSession,
    transport: Arc<dyn PeerTransport>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    signals: Arc<dyn SignalSink>,
    relay_events: mpsc::UnboundedReceiver<RelayEvent>,
    devices: Arc<dyn MediaDevices>,
    wallet: Arc<dyn WalletService>,
    timers: TimerSet,
    timer_ticks: mpsc::UnboundedReceiver<TimerKind>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionRunner {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        join_effects: Vec<Effect>,
    ) -> SessionSummary {
        self.apply(join_effects).await;

        while !self.session.is_ended() {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::info!("Session handle dropped, leaving");
                        let effects = self.session.leave(Instant::now());
                        self.apply(effects).await;
                    }
                },

                Some(event) = self.relay_events.recv() => {
                    let effects = match event {
                        RelayEvent::Connected => {
                            tracing::debug!("Relay connected");
                            Vec::new()
                        }
                        RelayEvent::Message { sender_id, message } => {
                            self.session.handle_signal(&sender_id, message, Instant::now())
                        }
                        RelayEvent::Disconnected => {
                            tracing::warn!("Relay connection lost");
                            self.session.end(EndReason::RelayDisconnected, Instant::now())
                        }
                    };
                    self.apply(effects).await;
                }

                Some(event) = self.peer_events.recv() => {
                    let effects = self.session.on_peer_event(event, Instant::now());
                    self.apply(effects).await;
                }

                Some(kind) = self.timer_ticks.recv() => {
                    let effects = self.session.tick(kind, Instant::now());
                    self.apply(effects).await;
                }
            }
        }

        self.timers.cancel_all();
        let summary = self.session.summary(Instant::now());
        tracing::info!(
            "Session {} finished after {}s ({} billed minute(s))",
            summary.session_id,
            summary.elapsed_secs,
            summary.billed_minutes
        );
        summary
    }

    async fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::EnableVideo(reply) => {
                let result = self.enable_video(now);
                self.respond(result, reply).await;
            }
            Command::DisableVideo(reply) => {
                let result = self.session.disable_video();
                self.respond(result, reply).await;
            }
            Command::SetWindowVisible(visible, reply) => {
                let result = self.session.set_window_visible(visible);
                self.respond(result, reply).await;
            }
            Command::RecordInputActivity(reply) => {
                let result = self.session.record_input_activity(now);
                self.respond(result, reply).await;
            }
            Command::SetAudioEnabled(enabled, reply) => {
                let result = self.session.set_audio_enabled(enabled);
                self.respond(result, reply).await;
            }
            Command::StartPath {
                tool,
                color,
                size,
                point,
                reply,
            } => {
                let result = self.session.start_path(tool, &color, size, point);
                self.respond(result, reply).await;
            }
            Command::AddPoint {
                path_id,
                point,
                reply,
            } => {
                let result = self.session.add_point(&path_id, point);
                self.respond(result, reply).await;
            }
            Command::EndPath { path_id, reply } => {
                let result = self.session.end_path(&path_id);
                self.respond(result, reply).await;
            }
            Command::EraseAt { point, reply } => {
                let result = self.session.erase_at(point);
                self.respond(result, reply).await;
            }
            Command::RemovePath { path_id, reply } => {
                let result = self.session.remove_path(&path_id);
                self.respond(result, reply).await;
            }
            Command::ClearPage { page_number, reply } => {
                let result = self.session.clear_page(page_number);
                self.respond(result, reply).await;
            }
            Command::AddPage(reply) => {
                let result = self.session.add_page();
                self.respond(result, reply).await;
            }
            Command::SwitchPage { page_number, reply } => {
                let result = self.session.switch_page(page_number);
                self.respond(result, reply).await;
            }
            Command::ScrollTo { x, y, reply } => {
                let result = self.session.scroll_to(x, y);
                self.respond(result, reply).await;
            }
            Command::ShareImage { image_ref, reply } => {
                let result = self.session.share_image(&image_ref);
                self.respond(result, reply).await;
            }
            Command::RemoveImage(reply) => {
                let result = self.session.remove_image();
                self.respond(result, reply).await;
            }
            Command::SendChat { text, reply } => {
                let result = self.session.send_chat(&text);
                self.respond(result, reply).await;
            }
            Command::React { kind, reply } => {
                let result = self.session.react(kind, now);
                self.respond(result, reply).await;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot(now));
            }
            Command::Leave(reply) => {
                let effects = self.session.leave(now);
                self.apply(effects).await;
                let _ = reply.send(());
            }
        }
    }

    /// Kamera nur belegen, wenn Video wirklich neu eingeschaltet wird
    fn enable_video(&mut self, now: Instant) -> Outcome<VideoChange> {
        if self.session.video_enabled() {
            return self.session.enable_video(now);
        }

        self.session.ensure_video_available()?;
        if let Err(e) = self.devices.acquire_camera(&self.session.video_constraints()) {
            tracing::warn!("Camera unavailable: {}", e);
            return Err(e.into());
        }

        self.session.enable_video(now).inspect_err(|_| {
            self.devices.release_camera();
        })
    }

    async fn respond<T>(&mut self, result: Outcome<T>, reply: Reply<T>) {
        match result {
            Ok((value, effects)) => {
                self.apply(effects).await;
                let _ = reply.send(Ok(value));
            }
            Err(e) => {
                tracing::debug!("Command rejected: {}", e);
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Führt Effekte aus. Ergebnisse von Peer-Aktionen gehen zurück an die
    /// Session, deren Folge-Effekte werden hinten angestellt.
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Signal(message) => {
                    let name = message.name();
                    if let Err(e) = self.signals.send(message) {
                        tracing::warn!("Failed to send {}: {}", name, e);
                    }
                }
                Effect::Peer(action) => {
                    if let Some(event) = self.run_peer_action(action).await {
                        queue.extend(self.session.on_peer_event(event, Instant::now()));
                    }
                }
                Effect::StartTimer { kind, period } => self.timers.start(kind, period),
                Effect::StopTimer(kind) => {
                    self.timers.cancel(kind);
                }
                Effect::CancelAllTimers => self.timers.cancel_all(),
                Effect::ReleaseCamera => self.devices.release_camera(),
                Effect::ReleaseDevices => self.devices.release_all(),
                Effect::Finalize(request) => {
                    let participant = request.participant_id.clone();
                    match self.wallet.finalize(request).await {
                        Ok(()) => tracing::info!("Session finalized for {}", participant),
                        Err(e) => {
                            tracing::error!("Failed to finalize session: {}", e);
                            self.notify(SessionNotice::Error {
                                message: format!("Failed to finalize session: {e}"),
                            });
                        }
                    }
                }
                Effect::Notify(notice) => self.notify(notice),
            }
        }
    }

    async fn run_peer_action(&self, action: PeerAction) -> Option<PeerEvent> {
        match action {
            PeerAction::CreateOffer => Some(match self.transport.create_offer().await {
                Ok(sdp) => PeerEvent::OfferCreated(sdp),
                Err(e) => PeerEvent::NegotiationFailed(format!("Failed to create offer: {e}")),
            }),
            PeerAction::AcceptOffer(sdp) => Some(match self.transport.accept_offer(sdp).await {
                Ok(answer) => PeerEvent::AnswerCreated(answer),
                Err(e) => PeerEvent::NegotiationFailed(format!("Failed to accept offer: {e}")),
            }),
            PeerAction::ApplyAnswer(sdp) => Some(match self.transport.apply_answer(sdp).await {
                Ok(()) => PeerEvent::AnswerApplied,
                Err(e) => PeerEvent::NegotiationFailed(format!("Failed to apply answer: {e}")),
            }),
            PeerAction::AddCandidate(candidate) => {
                if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                    tracing::warn!("Failed to add ICE candidate: {}", e);
                }
                None
            }
            PeerAction::AttachVideo(constraints) => {
                Some(match self.transport.attach_video(constraints).await {
                    Ok(()) => PeerEvent::VideoAttached,
                    Err(e) => PeerEvent::VideoAttachFailed(e.to_string()),
                })
            }
            PeerAction::DetachVideo => {
                if let Err(e) = self.transport.detach_video().await {
                    tracing::warn!("Failed to detach video: {}", e);
                }
                None
            }
            PeerAction::SampleStats => match self.transport.inbound_stats().await {
                Ok(stats) => Some(PeerEvent::StatsSampled(stats)),
                Err(e) => {
                    tracing::debug!("No inbound stats: {}", e);
                    None
                }
            },
            PeerAction::Close => {
                self.transport.close().await;
                None
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        // ohne Empfänger ist das kein Fehler
        let _ = self.notices.send(notice);
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Zugriff der Oberfläche auf eine laufende Session
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<SessionNotice>,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    pub async fn enable_video(&self) -> Result<VideoChange, SessionError> {
        self.request(Command::EnableVideo).await
    }

    pub async fn disable_video(&self) -> Result<bool, SessionError> {
        self.request(Command::DisableVideo).await
    }

    pub async fn set_window_visible(&self, visible: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::SetWindowVisible(visible, reply)).await
    }

    pub async fn record_input_activity(&self) -> Result<(), SessionError> {
        self.request(Command::RecordInputActivity).await
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::SetAudioEnabled(enabled, reply)).await
    }

    /// Beginnt einen Strich, gibt dessen ID zurück
    pub async fn start_path(
        &self,
        tool: Tool,
        color: impl Into<String>,
        size: f64,
        point: Point,
    ) -> Result<String, SessionError> {
        let color = color.into();
        self.request(|reply| Command::StartPath {
            tool,
            color,
            size,
            point,
            reply,
        })
        .await
    }

    pub async fn add_point(&self, path_id: &str, point: Point) -> Result<(), SessionError> {
        let path_id = path_id.to_string();
        self.request(|reply| Command::AddPoint {
            path_id,
            point,
            reply,
        })
        .await
    }

    pub async fn end_path(&self, path_id: &str) -> Result<(), SessionError> {
        let path_id = path_id.to_string();
        self.request(|reply| Command::EndPath { path_id, reply }).await
    }

    pub async fn erase_at(&self, point: Point) -> Result<Option<String>, SessionError> {
        self.request(|reply| Command::EraseAt { point, reply }).await
    }

    pub async fn remove_path(&self, path_id: &str) -> Result<(), SessionError> {
        let path_id = path_id.to_string();
        self.request(|reply| Command::RemovePath { path_id, reply }).await
    }

    pub async fn clear_page(&self, page_number: u32) -> Result<(), SessionError> {
        self.request(|reply| Command::ClearPage { page_number, reply }).await
    }

    pub async fn add_page(&self) -> Result<u32, SessionError> {
        self.request(Command::AddPage).await
    }

    pub async fn switch_page(&self, page_number: u32) -> Result<(), SessionError> {
        self.request(|reply| Command::SwitchPage { page_number, reply }).await
    }

    pub async fn scroll_to(&self, x: f64, y: f64) -> Result<(), SessionError> {
        self.request(|reply| Command::ScrollTo { x, y, reply }).await
    }

    pub async fn share_image(&self, image_ref: impl Into<String>) -> Result<(), SessionError> {
        let image_ref = image_ref.into();
        self.request(|reply| Command::ShareImage { image_ref, reply }).await
    }

    pub async fn remove_image(&self) -> Result<bool, SessionError> {
        self.request(Command::RemoveImage).await
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendChat { text, reply }).await
    }

    pub async fn react(&self, kind: ReactionKind) -> Result<ReactionEvent, SessionError> {
        self.request(|reply| Command::React { kind, reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Verlässt die Session. Nach dem Ende ist das ein No-op.
    pub async fn leave(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Leave(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Wartet auf das Ende der Session
    pub async fn finished(self) -> Result<SessionSummary, SessionError> {
        // Kanal offen halten, sonst wertet der Runner das als Verlassen
        let SessionHandle {
            commands: _commands,
            task,
            ..
        } = self;
        task.await.map_err(|e| SessionError::Runner(e.to_string()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
