//! Wire Messages
//!
//! Client-side view of the server protocol. Type tags are snake_case,
//! field names camelCase. Server-to-client shapes only need `Deserialize`
//! here; client-to-server only `Serialize`.

use serde::{Deserialize, Serialize};

/// Authenticated user identifier.
pub type UserId = i64;

/// Successful queue-join response from the request layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoinResponse {
    /// 1-based position among tickets of the same mode.
    pub position: u32,
    /// Estimated wait in seconds.
    pub estimated_wait: u32,
    /// Single-use credential for the matchmaking channel.
    pub ws_token: String,
}

/// Messages received on the matchmaking channel.
///
/// `MatchFound` is terminal; the server closes the channel after it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChannelMessage {
    /// Ticket accepted, channel attached.
    QueueJoined {
        /// 1-based position among tickets of the same mode.
        position: u32,
        /// Estimated wait in seconds.
        estimated_wait: u32,
    },

    /// Position changed.
    QueueUpdate {
        /// 1-based position among tickets of the same mode.
        position: u32,
        /// Estimated wait in seconds.
        estimated_wait: u32,
    },

    /// A match was found. Terminal for this channel.
    MatchFound {
        /// Identifier of the created game session.
        match_session_id: String,
        /// Single-use credential for the game-session endpoint.
        join_token: String,
        /// The paired opponent.
        opponent: OpponentInfo,
    },

    /// Post-match result notification.
    MatchComplete {
        /// Outcome from this player's perspective.
        result: MatchOutcome,
    },

    /// Terminal error.
    Error {
        /// Error code.
        error: ErrorCode,
    },
}

/// Opponent summary delivered with `match_found`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    /// Opponent user id.
    pub id: UserId,
    /// Opponent display name.
    pub display_name: String,
    /// Opponent rating.
    pub rating: i32,
    /// Opponent rating tier name.
    pub tier: String,
}

/// Match outcome from this player's perspective.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    /// Whether this player won.
    pub won: bool,
    /// Rating delta applied.
    pub rating_change: i32,
    /// Rating after the change.
    pub new_rating: i32,
}

/// Messages received on the game-session socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameServerMessage {
    /// Join credential accepted, seat taken.
    Joined {
        /// Session identifier.
        match_session_id: String,
        /// This player's own id.
        user_id: UserId,
    },

    /// Waiting for the opponent.
    Waiting,

    /// Countdown tick before play begins.
    Countdown {
        /// Seconds remaining.
        seconds: u32,
    },

    /// Countdown finished, the match is live.
    Started,

    /// Authoritative state sample for interpolation.
    Snapshot {
        /// Authoritative clock, seconds.
        timestamp: f64,
        /// Sampled entities.
        entities: Vec<EntitySnapshot>,
    },

    /// A peer's connection dropped.
    PeerLeft {
        /// The departed player's id.
        user_id: UserId,
    },

    /// A disconnected peer resumed.
    PeerReconnected {
        /// The resumed player's id.
        user_id: UserId,
    },

    /// Pong reply for latency measurement.
    Pong {
        /// Echoed client timestamp (ms).
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        server_time: u64,
    },

    /// Terminal error.
    Error {
        /// Error code.
        error: ErrorCode,
    },
}

/// One entity's authoritative position sample.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Stable entity identifier.
    pub entity_id: String,
    /// Position in world units.
    pub position: [f32; 2],
}

/// Messages sent on the game-session socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameClientMessage {
    /// Latency probe.
    Ping {
        /// Client timestamp (ms).
        timestamp: u64,
    },
    /// Deliberate exit from the session.
    Leave,
}

/// Error codes surfaced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Credential absent, already consumed, or past expiry.
    InvalidOrExpiredToken,
    /// Duplicate queue-join without an intervening leave.
    AlreadyQueued,
    /// Unparseable inbound frame.
    MalformedMessage,
    /// Unexpected server-side failure.
    InternalError,
}

impl ChannelMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl GameServerMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl GameClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
