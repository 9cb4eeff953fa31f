//! Audio Call Peer
//!
//! Runs one side of a peer-to-peer audio call over UDP.
//!
//! ```text
//! peer <local-port> [peer-host]
//! ```
//!
//! With a peer host this side is the initiator; without one it waits for
//! the first datagram and answers whoever sent it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use p2p_call_streamer::{
    audio::CpalBackend,
    codec::OpusCodecFactory,
    config::CallConfig,
    network::Role,
    Call, CallEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting P2P call peer");

    let mut config = CallConfig::load_or_default().context("loading config")?;

    let mut args = std::env::args().skip(1);
    if let Some(port) = args.next() {
        config.network.port = port.parse().context("invalid local port")?;
    }
    let peer_host = args.next();
    let role = Role::from_initiator(peer_host.is_some());

    let call = Call::new(config).context("binding call session")?;
    if let Some(addr) = call.session().local_addr() {
        tracing::info!("Listening on {}", addr);
    }
    let events = call.events();

    call.start_audio(Arc::new(CpalBackend), &OpusCodecFactory)
        .context("starting audio pipeline")?;
    call.connect(peer_host.as_deref(), role)
        .context("connecting session")?;

    tracing::info!("Call running as {:?} - press Ctrl+C to hang up", role);

    let mut stats_tick = tokio::time::interval(Duration::from_secs(10));
    let mut event_tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Hanging up");
                break;
            }
            _ = event_tick.tick() => {
                match events.try_recv() {
                    Ok(CallEvent::Ready) => tracing::info!("Session ready"),
                    Ok(CallEvent::Terminated(reason)) => {
                        tracing::error!("Call terminated: {}", reason);
                        break;
                    }
                    Err(_) => {}
                }
            }
            _ = stats_tick.tick() => {
                let stats = call.stats();
                let peer = call
                    .session()
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "unknown".into());
                tracing::info!(
                    "Stats: peer {}, {} packets sent ({:.1} KB), {} received ({:.1} KB), {} overwritten, {} dropped",
                    peer,
                    stats.packets_sent,
                    stats.bytes_sent as f64 / 1024.0,
                    stats.packets_received,
                    stats.bytes_received as f64 / 1024.0,
                    stats.overwritten,
                    stats.dropped_not_ready + stats.dropped_oversize
                );
                if let Some(audio) = call.audio_stats() {
                    tracing::info!(
                        "Audio: {} frames encoded, {} decoded",
                        audio.frames_encoded,
                        audio.frames_decoded
                    );
                }
            }
        }
    }

    call.close();
    Ok(())
}
