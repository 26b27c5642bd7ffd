//! Demo binary.
//!
//! With `PADDLE_SERVER_URL` and `PADDLE_WS_TOKEN` set, drives one full
//! matchmaking-to-game handoff against a live server and logs every phase
//! transition. Without them, runs an offline loop that feeds synthetic
//! snapshots through the fixed-timestep and interpolation machinery, for
//! eyeballing smoothness tuning with no server at all.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use paddle_client::connection::ConnectionEvent;
use paddle_client::handoff::SessionHandoff;
use paddle_client::messages::{GameClientMessage, GameServerMessage};
use paddle_client::snapshot::{InterpolationClock, SnapshotBuffer};
use paddle_client::timestep::FixedTimestep;
use paddle_client::{GameConnection, MatchmakingChannel};

/// Synthetic snapshot rate for the offline demo, matching the server's
/// broadcast cadence.
const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match (
        std::env::var("PADDLE_SERVER_URL"),
        std::env::var("PADDLE_WS_TOKEN"),
    ) {
        (Ok(url), Ok(token)) => live_handoff(&url, &token).await,
        _ => offline_demo().await,
    }
}

/// Queue-to-countdown against a real server. The `ws_token` comes from a
/// prior queue-join request; this binary picks up from the channel leg.
async fn live_handoff(base_url: &str, ws_token: &str) -> Result<()> {
    let mut handoff = SessionHandoff::new();

    let mut channel = MatchmakingChannel::connect(base_url, ws_token)
        .await
        .context("opening matchmaking channel")?;
    handoff.queue_accepted();
    info!(phase = ?handoff.phase(), "channel open, waiting for a match");

    let found = channel.wait_for_match().await?;
    handoff.on_channel_message(found);
    drop(channel);

    let session_id = handoff
        .pending_match()
        .map(|p| p.match_session_id.clone())
        .context("match_found carried no session")?;
    let join_token = handoff
        .take_join_token()
        .context("join token already consumed")?;
    info!(phase = ?handoff.phase(), %session_id, "match found, joining session");

    let mut game = GameConnection::connect(base_url, &session_id, &join_token)
        .await
        .context("opening game socket")?;

    let mut buffer = SnapshotBuffer::new();
    let mut clock = InterpolationClock::default();

    while let Some(message) = game.recv().await {
        match message {
            GameServerMessage::Joined { user_id, .. } => {
                handoff.on_game_event(ConnectionEvent::GameJoined);
                info!(phase = ?handoff.phase(), user_id, "seat taken");
            }
            GameServerMessage::Waiting => info!("waiting for opponent"),
            GameServerMessage::Countdown { seconds } => {
                handoff.on_game_event(ConnectionEvent::CountdownStarted);
                info!(phase = ?handoff.phase(), seconds, "countdown");
            }
            GameServerMessage::Started => {
                handoff.on_game_event(ConnectionEvent::MatchStarted);
                info!(phase = ?handoff.phase(), "match started");
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                game.send(GameClientMessage::Ping { timestamp }).await?;
            }
            GameServerMessage::Snapshot { timestamp, entities } => {
                clock.observe(timestamp);
                for entity in entities {
                    buffer.push(&entity.entity_id, timestamp, entity.position);
                }
                if let Some(at) = clock.render_time() {
                    if let Some([x, y]) = buffer.sample("ball", at) {
                        info!(x = format!("{:.2}", x), y = format!("{:.2}", y), "ball");
                    }
                }
            }
            GameServerMessage::Pong { timestamp, server_time } => {
                info!(timestamp, server_time, "pong");
            }
            GameServerMessage::PeerLeft { user_id } => info!(user_id, "peer left"),
            GameServerMessage::PeerReconnected { user_id } => {
                info!(user_id, "peer reconnected")
            }
            GameServerMessage::Error { error } => {
                anyhow::bail!("server error: {:?}", error);
            }
        }
    }

    info!("game socket closed");
    Ok(())
}

/// Offline loop: synthetic snapshots, no server.
async fn offline_demo() -> Result<()> {
    info!("no PADDLE_SERVER_URL set, running offline interpolation demo");

    let mut timestep = FixedTimestep::default();
    let mut buffer = SnapshotBuffer::new();
    let mut clock = InterpolationClock::default();

    let start = Instant::now();
    let mut last_frame = start;
    let mut last_snapshot = start - SNAPSHOT_INTERVAL;
    let mut sim_steps: u64 = 0;

    while start.elapsed() < Duration::from_secs(3) {
        let now = Instant::now();
        let frame_delta = now - last_frame;
        last_frame = now;

        // Pretend the server broadcast a snapshot: the ball sweeps a sine
        // arc across the arena.
        if now - last_snapshot >= SNAPSHOT_INTERVAL {
            last_snapshot = now;
            let t = start.elapsed().as_secs_f64();
            let x = (t * 2.0).sin() as f32 * 5.0;
            let y = (t * 3.0).cos() as f32 * 3.0;
            buffer.push("ball", t, [x, y]);
            clock.observe(t);
        }

        for _ in 0..timestep.advance(frame_delta) {
            sim_steps += 1;
        }

        if let Some(at) = clock.render_time() {
            if let Some([x, y]) = buffer.sample("ball", at) {
                info!(
                    render_time = format!("{:.3}", at),
                    x = format!("{:.2}", x),
                    y = format!("{:.2}", y),
                    alpha = format!("{:.2}", timestep.alpha()),
                    "frame"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    info!(sim_steps, "demo finished");
    Ok(())
}
