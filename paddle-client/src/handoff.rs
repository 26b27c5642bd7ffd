//! Session Handoff
//!
//! Client-side bookkeeping for the matchmaking-to-game handoff: holds the
//! credentials as they arrive, drives the connection lifecycle from channel
//! traffic, and releases the join token exactly once when the game socket
//! is dialed. The server also enforces single use; doing it here as well
//! keeps a client bug from burning the credential on a duplicate dial.

use tracing::{debug, warn};

use crate::connection::{ConnectionEvent, ConnectionLifecycle, ConnectionPhase};
use crate::messages::{ChannelMessage, ErrorCode, OpponentInfo};

/// The pairing delivered by `match_found`.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    /// Session to join.
    pub match_session_id: String,
    /// The paired opponent.
    pub opponent: OpponentInfo,
}

/// Tracks one queue-to-session handoff.
#[derive(Debug, Default)]
pub struct SessionHandoff {
    lifecycle: ConnectionLifecycle,
    join_token: Option<String>,
    pending: Option<PendingMatch>,
    queue_position: Option<u32>,
    last_error: Option<ErrorCode>,
}

impl SessionHandoff {
    /// Start idle, before any queue join.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.lifecycle.phase()
    }

    /// Most recent queue position, while queued.
    pub fn queue_position(&self) -> Option<u32> {
        self.queue_position
    }

    /// The pairing, once `match_found` has arrived.
    pub fn pending_match(&self) -> Option<&PendingMatch> {
        self.pending.as_ref()
    }

    /// Terminal error reported on the channel, if any.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    /// The queue join was accepted and the channel opened.
    pub fn queue_accepted(&mut self) {
        self.last_error = None;
        self.lifecycle.apply(ConnectionEvent::QueueAccepted);
    }

    /// Feed one channel message.
    pub fn on_channel_message(&mut self, message: ChannelMessage) {
        match message {
            ChannelMessage::QueueJoined { position, .. }
            | ChannelMessage::QueueUpdate { position, .. } => {
                self.queue_position = Some(position);
            }
            ChannelMessage::MatchFound {
                match_session_id,
                join_token,
                opponent,
            } => {
                if self.pending.is_some() {
                    // The channel contract makes this unreachable, but a
                    // second credential must never clobber the first.
                    warn!("duplicate match_found ignored");
                    return;
                }
                debug!(%match_session_id, opponent = opponent.id, "match found");
                self.join_token = Some(join_token);
                self.pending = Some(PendingMatch {
                    match_session_id,
                    opponent,
                });
                self.queue_position = None;
                self.lifecycle.apply(ConnectionEvent::MatchFound);
            }
            ChannelMessage::MatchComplete { .. } => {}
            ChannelMessage::Error { error } => {
                warn!(?error, "channel error");
                self.last_error = Some(error);
            }
        }
    }

    /// The channel closed. Drops back to Idle if no match was delivered.
    pub fn channel_closed(&mut self) {
        if self.phase() == ConnectionPhase::Queuing {
            self.queue_position = None;
            self.lifecycle.apply(ConnectionEvent::ChannelClosed);
        }
    }

    /// Take the join token for dialing the game socket. Yields the token
    /// at most once.
    pub fn take_join_token(&mut self) -> Option<String> {
        let token = self.join_token.take()?;
        self.lifecycle.apply(ConnectionEvent::GameConnecting);
        Some(token)
    }

    /// Forward a game-socket lifecycle event.
    pub fn on_game_event(&mut self, event: ConnectionEvent) -> ConnectionPhase {
        self.lifecycle.apply(event)
    }

    /// Abandon everything and return to Idle.
    pub fn reset(&mut self) {
        self.join_token = None;
        self.pending = None;
        self.queue_position = None;
        self.lifecycle.apply(ConnectionEvent::ExplicitDisconnect);
    }
}
