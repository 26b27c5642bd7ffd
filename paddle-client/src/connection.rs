//! Connection Lifecycle
//!
//! Phase machine for the whole queue-to-match journey. Network tasks and
//! UI code feed it events; invalid events for the current phase are logged
//! and ignored, so a late or duplicated message can never corrupt the
//! lifecycle.

use tracing::debug;

/// Where the client is in the queue-to-match journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Not queued, no session.
    Idle,
    /// Queued, matchmaking channel open.
    Queuing,
    /// `match_found` received, game socket not yet opened.
    Matched,
    /// Game socket connecting.
    Connecting,
    /// Seat taken, opponent not yet present.
    Waiting,
    /// Countdown running.
    Countdown,
    /// Match live.
    Playing,
    /// Connection lost mid-match, resume in progress.
    Reconnecting,
    /// Match over.
    Finished,
}

/// Lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Queue join accepted and channel opened.
    QueueAccepted,
    /// `match_found` arrived on the channel.
    MatchFound,
    /// The channel closed without a match.
    ChannelClosed,
    /// Game socket dial started.
    GameConnecting,
    /// `joined` arrived on the game socket.
    GameJoined,
    /// `countdown` arrived.
    CountdownStarted,
    /// `started` arrived.
    MatchStarted,
    /// The game socket dropped unexpectedly.
    ConnectionLost,
    /// A resume attempt succeeded.
    Resumed,
    /// Reconnection gave up or was rejected.
    Abandoned,
    /// The match ended.
    MatchFinished,
    /// The user backed out.
    ExplicitDisconnect,
}

/// The queue-to-match phase machine.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    phase: ConnectionPhase,
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionLifecycle {
    /// Start at Idle.
    pub fn new() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Apply an event; returns the new phase. Events invalid for the
    /// current phase leave it unchanged.
    pub fn apply(&mut self, event: ConnectionEvent) -> ConnectionPhase {
        use ConnectionEvent as E;
        use ConnectionPhase as P;

        let next = match (self.phase, event) {
            (P::Idle, E::QueueAccepted) => P::Queuing,
            (P::Queuing, E::MatchFound) => P::Matched,
            (P::Queuing, E::ChannelClosed) => P::Idle,
            (P::Matched, E::GameConnecting) => P::Connecting,
            (P::Connecting, E::GameJoined) => P::Waiting,
            (P::Waiting, E::CountdownStarted) => P::Countdown,
            (P::Countdown, E::MatchStarted) => P::Playing,
            (P::Playing, E::ConnectionLost) => P::Reconnecting,
            (P::Reconnecting, E::Resumed) => P::Playing,
            (P::Reconnecting, E::Abandoned) => P::Idle,
            (P::Playing, E::MatchFinished) => P::Finished,
            (_, E::ExplicitDisconnect) => P::Idle,
            (phase, event) => {
                debug!(?phase, ?event, "event ignored in current phase");
                phase
            }
        };
        self.phase = next;
        next
    }
}
