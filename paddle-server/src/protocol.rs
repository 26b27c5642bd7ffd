//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON: type tags are snake_case,
//! field names camelCase (the contract the web clients already speak).

use serde::{Deserialize, Serialize};

/// Authenticated user identifier, assigned by the out-of-scope account layer.
pub type UserId = i64;

// =============================================================================
// QUEUE JOIN / LEAVE (carried by the thin HTTP layer, out of scope here)
// =============================================================================

/// Queue-join request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoinRequest {
    /// Requested match mode.
    pub mode: QueueMode,
}

/// Successful queue-join response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoinResponse {
    /// 1-based position among tickets of the same mode.
    pub position: u32,
    /// Estimated wait in seconds.
    pub estimated_wait: u32,
    /// Single-use credential for opening the matchmaking channel.
    pub ws_token: String,
}

/// Match modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Rated matches.
    Ranked,
    /// Unrated matches.
    Casual,
}

// =============================================================================
// MATCHMAKING CHANNEL, SERVER -> CLIENT
// =============================================================================

/// Messages pushed on a matchmaking channel.
///
/// Ordering guarantee: `MatchFound` is always the last message on a channel;
/// the server closes the channel immediately after delivering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChannelMessage {
    /// Ticket accepted, channel attached.
    QueueJoined {
        /// 1-based position among tickets of the same mode.
        position: u32,
        /// Estimated wait in seconds.
        estimated_wait: u32,
    },

    /// Position changed (someone ahead paired or left).
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
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Match outcome from one player's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    /// Whether this player won.
    pub won: bool,
    /// Rating delta applied.
    pub rating_change: i32,
    /// Rating after the change.
    pub new_rating: i32,
}

// =============================================================================
// GAME SESSION SOCKET
// =============================================================================

/// Messages sent by the server on a game-session socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameServerMessage {
    /// Join credential accepted, seat taken.
    Joined {
        /// Session identifier.
        match_session_id: String,
        /// The joining player's own id.
        user_id: UserId,
    },

    /// Waiting for the opponent to present their credential.
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

    /// A peer's connection dropped; it may resume within the reconnect window.
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
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Stable entity identifier.
    pub entity_id: String,
    /// Position in world units.
    pub position: [f32; 2],
}

/// Messages sent by the client on a game-session socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

// =============================================================================
// ERRORS
// =============================================================================

/// Error codes surfaced to clients.
///
/// Absence, prior consumption, and expiry of a credential are deliberately
/// indistinguishable: an unauthenticated caller learns nothing from the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ChannelMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl GameServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

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

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_joined_wire_shape() {
        let msg = ChannelMessage::QueueJoined {
            position: 1,
            estimated_wait: 30,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"queue_joined\""));
        assert!(json.contains("\"estimatedWait\":30"));
        assert!(json.contains("\"position\":1"));
    }

    #[test]
    fn test_match_found_wire_shape() {
        let msg = ChannelMessage::MatchFound {
            match_session_id: "abc".into(),
            join_token: "deadbeef".into(),
            opponent: OpponentInfo {
                id: 42,
                display_name: "rival".into(),
                rating: 1200,
                tier: "gold".into(),
            },
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"match_found\""));
        assert!(json.contains("\"matchSessionId\":\"abc\""));
        assert!(json.contains("\"joinToken\":\"deadbeef\""));
        assert!(json.contains("\"displayName\":\"rival\""));
    }

    #[test]
    fn test_channel_message_roundtrip() {
        let msg = ChannelMessage::MatchComplete {
            result: MatchOutcome {
                won: true,
                rating_change: 17,
                new_rating: 1217,
            },
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"ratingChange\":17"));
        let parsed = ChannelMessage::from_json(&json).unwrap();
        match parsed {
            ChannelMessage::MatchComplete { result } => {
                assert!(result.won);
                assert_eq!(result.new_rating, 1217);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_error_code_wire_names() {
        let msg = ChannelMessage::Error {
            error: ErrorCode::InvalidOrExpiredToken,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"error\":\"invalid_or_expired_token\""));

        let msg = ChannelMessage::Error {
            error: ErrorCode::AlreadyQueued,
        };
        assert!(msg.to_json().unwrap().contains("already_queued"));
    }

    #[test]
    fn test_queue_join_response_shape() {
        let resp = QueueJoinResponse {
            position: 2,
            estimated_wait: 30,
            ws_token: "t".into(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"wsToken\":\"t\""));
        assert!(json.contains("\"estimatedWait\":30"));
    }

    #[test]
    fn test_queue_mode_tags() {
        let json = serde_json::to_string(&QueueJoinRequest {
            mode: QueueMode::Ranked,
        })
        .unwrap();
        assert!(json.contains("\"mode\":\"ranked\""));
        let parsed: QueueJoinRequest = serde_json::from_str("{\"mode\":\"casual\"}").unwrap();
        assert_eq!(parsed.mode, QueueMode::Casual);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let msg = GameServerMessage::Snapshot {
            timestamp: 12.5,
            entities: vec![EntitySnapshot {
                entity_id: "ball".into(),
                position: [3.0, -1.5],
            }],
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"snapshot\""));
        assert!(json.contains("\"entityId\":\"ball\""));
        let parsed = GameServerMessage::from_json(&json).unwrap();
        match parsed {
            GameServerMessage::Snapshot { timestamp, entities } => {
                assert_eq!(timestamp, 12.5);
                assert_eq!(entities.len(), 1);
                assert_eq!(entities[0].position, [3.0, -1.5]);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_game_client_message_roundtrip() {
        let json = GameClientMessage::Ping { timestamp: 99 }.to_json().unwrap();
        assert!(json.contains("\"type\":\"ping\""));
        let parsed = GameClientMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, GameClientMessage::Ping { timestamp: 99 }));

        let json = GameClientMessage::Leave.to_json().unwrap();
        assert!(json.contains("\"type\":\"leave\""));
    }

    #[test]
    fn test_malformed_message_rejected() {
        assert!(ChannelMessage::from_json("{\"type\":\"nope\"}").is_err());
        assert!(GameClientMessage::from_json("not json").is_err());
    }
}
