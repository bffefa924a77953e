//! Demo: tritt einer Session über das Relay bei und protokolliert Hinweise
//!
//! Konfiguration über Umgebungsvariablen, siehe `coincall::config`.
//! Ctrl-C verlässt die Session.

use anyhow::Context;
use coincall::billing::InMemoryWallet;
use coincall::call_engine::{MediaDevices, WebRtcPeer};
use coincall::config::{metadata_from_env, opening_balance_from_env};
use coincall::session::{start_session, SessionDeps, SessionInfo, SessionNotice};
use coincall::signaling::RelayClient;
use coincall::EngineConfig;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coincall::init_tracing();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let meta = metadata_from_env(config.display_name.as_deref())
        .context("invalid session configuration")?;
    let info = SessionInfo::try_from(meta).context("invalid session metadata")?;
    let opening_balance = opening_balance_from_env()?;

    tracing::info!(
        "Starting session {} as {} with {}",
        info.session_id,
        info.local.id,
        info.remote.id
    );

    let (relay_tx, relay_events) = mpsc::unbounded_channel();
    let relay = RelayClient::connect(&config.relay_url, &info.session_id, &info.local.id, relay_tx)
        .await
        .context("failed to connect to relay")?;

    let (peer_tx, peer_events) = mpsc::unbounded_channel();
    let peer = WebRtcPeer::connect(config.ice_servers.clone(), peer_tx)
        .await
        .context("failed to create peer connection")?;

    let mut wallet = InMemoryWallet::new();
    if let Some((_, denomination)) = info.billing() {
        wallet = wallet.with_balance(info.local.id.clone(), denomination, opening_balance);
    }

    let deps = SessionDeps {
        transport: Arc::new(peer),
        peer_events,
        signals: Arc::new(relay),
        relay_events,
        devices: media_devices(),
        wallet: Arc::new(wallet),
    };

    let (handle, notices) = start_session(info, config.video_policy, deps).await?;
    let logger = tokio::spawn(log_notices(notices));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, leaving session");
            handle.leave().await;
        }
        _ = wait_for_end(&handle) => {}
    }

    let summary = handle.finished().await?;
    let _ = logger.await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(feature = "native-audio")]
fn media_devices() -> Arc<dyn MediaDevices> {
    Arc::new(coincall::call_engine::CpalDevices::new(false))
}

#[cfg(not(feature = "native-audio"))]
fn media_devices() -> Arc<dyn MediaDevices> {
    Arc::new(coincall::call_engine::VirtualDevices::available())
}

/// Wartet, bis die Session von selbst endet
async fn wait_for_end(handle: &coincall::SessionHandle) {
    let mut notices = handle.subscribe();
    loop {
        match notices.recv().await {
            Ok(SessionNotice::Ended { .. }) | Err(broadcast::error::RecvError::Closed) => break,
            _ => {}
        }
    }
}

async fn log_notices(mut notices: broadcast::Receiver<SessionNotice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => {
                let json = serde_json::to_string(&notice).unwrap_or_default();
                tracing::info!("Notice: {}", json);
                if matches!(notice, SessionNotice::Ended { .. }) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} notice(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
