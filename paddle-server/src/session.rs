//! Match Session Management
//!
//! Lifecycle of a two-player game session from the matchmaking handoff to
//! completion. Seats are reserved at pairing time; each seat is taken by
//! consuming a join credential at the game-session endpoint. Gameplay rules
//! are out of scope here: the session owns membership, the countdown, the
//! reconnect window, and snapshot fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::protocol::{EntitySnapshot, GameServerMessage, UserId};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Seats reserved, waiting for both join credentials.
    Waiting,
    /// Both players present, countdown running.
    Countdown,
    /// Match in progress.
    Playing,
    /// Match over or abandoned.
    Finished,
}

/// Connection state of one seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatConnection {
    /// Reserved at pairing, join credential not yet presented.
    Pending,
    /// Player connected.
    Connected,
    /// Player dropped; may resume until the reconnect window closes.
    Disconnected {
        /// When the drop happened.
        since: Instant,
    },
}

/// Seat reservation made at pairing time.
#[derive(Debug, Clone)]
pub struct SeatAssignment {
    /// Reserved player.
    pub user_id: UserId,
    /// Display name carried into the session.
    pub display_name: String,
}

/// Outcome of presenting a credential (or resuming) at the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Seat taken; the opponent has not arrived yet.
    Waiting,
    /// Seat taken and both players are now present.
    Ready,
    /// A disconnected seat was resumed.
    Resumed,
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The user holds no seat in this session.
    #[error("not a participant")]
    NotAParticipant,

    /// The seat already has a live connection.
    #[error("already joined")]
    AlreadyJoined,

    /// The reconnect window has closed.
    #[error("reconnect window closed")]
    ReconnectWindowClosed,

    /// Operation not valid in the current state.
    #[error("invalid session state")]
    InvalidState,
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Countdown length in seconds.
    pub countdown_secs: u32,
    /// How long a dropped player may resume during play.
    pub reconnect_timeout: Duration,
    /// How long a Waiting session survives before being reaped.
    pub join_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            reconnect_timeout: Duration::from_secs(30),
            join_window: Duration::from_secs(60),
        }
    }
}

struct Seat {
    user_id: UserId,
    #[allow(dead_code)]
    display_name: String,
    connection: SeatConnection,
    sender: Option<mpsc::Sender<GameServerMessage>>,
}

/// A two-player match session.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: String,
    /// Session configuration.
    pub config: SessionConfig,
    state: SessionState,
    seats: Vec<Seat>,
    created_at: Instant,
}

impl MatchSession {
    /// Create a session with both seats reserved.
    pub fn new(id: String, players: [SeatAssignment; 2], config: SessionConfig) -> Self {
        let seats = players
            .into_iter()
            .map(|p| Seat {
                user_id: p.user_id,
                display_name: p.display_name,
                connection: SeatConnection::Pending,
                sender: None,
            })
            .collect();

        Self {
            id,
            config,
            state: SessionState::Waiting,
            seats,
            created_at: Instant::now(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Take (or resume) the seat reserved for `user_id`.
    pub fn join(
        &mut self,
        user_id: UserId,
        sender: mpsc::Sender<GameServerMessage>,
    ) -> Result<JoinOutcome, SessionError> {
        if self.state == SessionState::Finished {
            return Err(SessionError::InvalidState);
        }

        let reconnect_timeout = self.config.reconnect_timeout;
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.user_id == user_id)
            .ok_or(SessionError::NotAParticipant)?;

        match seat.connection {
            SeatConnection::Pending => {
                seat.connection = SeatConnection::Connected;
                seat.sender = Some(sender);
                if self.all_connected() && self.state == SessionState::Waiting {
                    Ok(JoinOutcome::Ready)
                } else {
                    Ok(JoinOutcome::Waiting)
                }
            }
            SeatConnection::Disconnected { since } => {
                if since.elapsed() > reconnect_timeout {
                    return Err(SessionError::ReconnectWindowClosed);
                }
                seat.connection = SeatConnection::Connected;
                seat.sender = Some(sender);
                Ok(JoinOutcome::Resumed)
            }
            SeatConnection::Connected => Err(SessionError::AlreadyJoined),
        }
    }

    /// Mark a seat disconnected, keeping it resumable.
    /// Returns false if the user holds no seat.
    pub fn mark_disconnected(&mut self, user_id: UserId) -> bool {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.user_id == user_id) {
            seat.connection = SeatConnection::Disconnected {
                since: Instant::now(),
            };
            seat.sender = None;
            true
        } else {
            false
        }
    }

    /// Permanently remove a player (deliberate leave). Ends the match.
    pub fn remove_player(&mut self, user_id: UserId) -> bool {
        let before = self.seats.len();
        self.seats.retain(|s| s.user_id != user_id);
        if self.seats.len() < before {
            // A two-player match cannot continue short-handed.
            self.state = SessionState::Finished;
            true
        } else {
            false
        }
    }

    /// Whether both seats have live connections.
    pub fn all_connected(&self) -> bool {
        self.seats.len() == 2
            && self
                .seats
                .iter()
                .all(|s| s.connection == SeatConnection::Connected)
    }

    /// Transition Waiting -> Countdown.
    pub fn begin_countdown(&mut self) {
        if self.state == SessionState::Waiting {
            self.state = SessionState::Countdown;
        }
    }

    /// Transition Countdown -> Playing.
    pub fn begin_playing(&mut self) {
        if self.state == SessionState::Countdown {
            self.state = SessionState::Playing;
        }
    }

    /// Mark the session over.
    pub fn finish(&mut self) {
        self.state = SessionState::Finished;
    }

    /// Whether a Waiting session has outlived its join window.
    pub fn join_window_elapsed(&self) -> bool {
        self.state == SessionState::Waiting && self.created_at.elapsed() > self.config.join_window
    }

    /// Send a message to every connected seat.
    pub async fn broadcast(&self, message: GameServerMessage) {
        for seat in &self.seats {
            if let Some(sender) = &seat.sender {
                if sender.send(message.clone()).await.is_err() {
                    debug!(user_id = seat.user_id, "dropping message for gone seat");
                }
            }
        }
    }

    /// Fan out an authoritative snapshot to all connected seats.
    ///
    /// The snapshot source (the match authority) lives behind this seam;
    /// gameplay rules are not this module's concern.
    pub async fn push_snapshot(&self, timestamp: f64, entities: Vec<EntitySnapshot>) {
        self.broadcast(GameServerMessage::Snapshot {
            timestamp,
            entities,
        })
        .await;
    }

    /// Seats with a live connection.
    pub fn connected_count(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| s.connection == SeatConnection::Connected)
            .count()
    }

    #[cfg(test)]
    fn backdate_disconnect(&mut self, user_id: UserId, by: Duration) {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.user_id == user_id) {
            seat.connection = SeatConnection::Disconnected {
                since: Instant::now() - by,
            };
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Registry of active sessions, keyed by session id.
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<RwLock<MatchSession>>>>,
}

impl SessionManager {
    /// Create a manager that stamps new sessions with `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session with both seats reserved; returns its id.
    pub async fn create(&self, players: [SeatAssignment; 2]) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = MatchSession::new(id.clone(), players, self.config.clone());

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), Arc::new(RwLock::new(session)));
        id
    }

    /// Get a session by id.
    pub async fn get(&self, id: &str) -> Option<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Remove a session.
    pub async fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop finished sessions and Waiting sessions past their join window.
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;
        let mut to_remove = Vec::new();

        for (id, session) in sessions.iter() {
            let s = session.read().await;
            if s.state() == SessionState::Finished || s.join_window_elapsed() {
                to_remove.push(id.clone());
            }
        }

        for id in to_remove {
            sessions.remove(&id);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
