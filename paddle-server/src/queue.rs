//! Queue Coordinator
//!
//! Tracks waiting tickets, pairs compatible players, and hands each matched
//! player a single-use join credential for the game-session endpoint.
//!
//! A ticket is created by the queue-join operation (carried by the
//! out-of-scope HTTP layer), attached to a matchmaking channel once the
//! client connects with its channel credential, and destroyed by pairing,
//! explicit leave, or channel disconnect (implicit leave). "Find a partner
//! and remove both tickets" happens as one step under the queue lock, so a
//! ticket can never be paired twice.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::credentials::{ChannelClaims, CredentialStore, JoinClaims};
use crate::protocol::{
    ChannelMessage, OpponentInfo, QueueJoinResponse, QueueMode, UserId,
};
use crate::session::{SeatAssignment, SessionManager};

/// Estimated wait reported to queued players, in seconds.
/// A constant heuristic until the queue has enough history to do better.
pub const DEFAULT_ESTIMATED_WAIT_SECS: u32 = 30;

/// Identity and ranking data for a queueing player, supplied by the
/// out-of-scope account layer along with the authenticated user id.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    /// Authenticated user id.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Current rating.
    pub rating: i32,
    /// Rating tier name.
    pub tier: String,
}

impl PlayerProfile {
    fn opponent_info(&self) -> OpponentInfo {
        OpponentInfo {
            id: self.user_id,
            display_name: self.display_name.clone(),
            rating: self.rating,
            tier: self.tier.clone(),
        }
    }
}

/// Queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The user already holds a ticket (conflict; leave-then-retry).
    #[error("already queued")]
    AlreadyQueued,

    /// No ticket exists for the user.
    #[error("not queued")]
    NotQueued,
}

struct QueueTicket {
    profile: PlayerProfile,
    mode: QueueMode,
    #[allow(dead_code)]
    enqueued_at: Instant,
    /// Present once the matchmaking channel is attached. A ticket is only
    /// eligible for pairing while it can deliver `match_found`.
    sender: Option<mpsc::Sender<ChannelMessage>>,
}

/// Pairs waiting tickets and mints join credentials.
pub struct QueueCoordinator {
    channel_credentials: Arc<CredentialStore<ChannelClaims>>,
    join_credentials: Arc<CredentialStore<JoinClaims>>,
    sessions: Arc<SessionManager>,
    tickets: Mutex<Vec<QueueTicket>>,
}

impl QueueCoordinator {
    /// Create a coordinator over the given credential stores and sessions.
    pub fn new(
        channel_credentials: Arc<CredentialStore<ChannelClaims>>,
        join_credentials: Arc<CredentialStore<JoinClaims>>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            channel_credentials,
            join_credentials,
            sessions,
            tickets: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue a player and mint their channel credential.
    ///
    /// Duplicate joins conflict with [`QueueError::AlreadyQueued`] rather
    /// than creating a second ticket, so a client racing stale server state
    /// can leave-then-retry.
    pub async fn join(
        &self,
        profile: PlayerProfile,
        mode: QueueMode,
    ) -> Result<QueueJoinResponse, QueueError> {
        let mut tickets = self.tickets.lock().await;

        if tickets.iter().any(|t| t.profile.user_id == profile.user_id) {
            return Err(QueueError::AlreadyQueued);
        }

        let ws_token = self.channel_credentials.mint(ChannelClaims {
            user_id: profile.user_id,
        });
        let position = tickets.iter().filter(|t| t.mode == mode).count() as u32 + 1;

        debug!(user_id = profile.user_id, ?mode, position, "ticket enqueued");
        tickets.push(QueueTicket {
            profile,
            mode,
            enqueued_at: Instant::now(),
            sender: None,
        });

        Ok(QueueJoinResponse {
            position,
            estimated_wait: DEFAULT_ESTIMATED_WAIT_SECS,
            ws_token,
        })
    }

    /// Drop a player's ticket. Idempotent.
    pub async fn leave(&self, user_id: UserId) {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|t| t.profile.user_id != user_id);
        if tickets.len() < before {
            debug!(user_id, "ticket removed");
            broadcast_positions(&tickets).await;
        }
    }

    /// Attach an opened matchmaking channel to the user's ticket, confirm
    /// with `queue_joined`, and run a pairing scan.
    pub async fn attach_channel(
        &self,
        user_id: UserId,
        sender: mpsc::Sender<ChannelMessage>,
    ) -> Result<(), QueueError> {
        let mut tickets = self.tickets.lock().await;

        let idx = tickets
            .iter()
            .position(|t| t.profile.user_id == user_id)
            .ok_or(QueueError::NotQueued)?;
        tickets[idx].sender = Some(sender.clone());

        let position = mode_position(&tickets, idx);
        let _ = sender
            .send(ChannelMessage::QueueJoined {
                position,
                estimated_wait: DEFAULT_ESTIMATED_WAIT_SECS,
            })
            .await;

        self.pair_scan(&mut tickets, user_id).await;
        Ok(())
    }

    /// Implicit leave: the channel for this user's ticket closed.
    pub async fn detach_channel(&self, user_id: UserId) {
        self.leave(user_id).await;
    }

    /// Number of waiting tickets.
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }

    /// Pair `user_id`'s ticket with the first compatible attached ticket,
    /// removing both, creating the session, and delivering `match_found`.
    /// Runs entirely under the queue lock.
    async fn pair_scan(&self, tickets: &mut Vec<QueueTicket>, user_id: UserId) {
        let Some(a_idx) = tickets
            .iter()
            .position(|t| t.profile.user_id == user_id && t.sender.is_some())
        else {
            return;
        };
        let mode = tickets[a_idx].mode;

        let Some(b_idx) = find_partner(tickets, mode, user_id) else {
            return;
        };

        // Remove higher index first so the lower one stays valid.
        let (first, second) = if a_idx > b_idx {
            (a_idx, b_idx)
        } else {
            (b_idx, a_idx)
        };
        let x = tickets.remove(first);
        let y = tickets.remove(second);
        // Earlier arrival is player A, purely for log readability.
        let (a, b) = if x.enqueued_at <= y.enqueued_at {
            (x, y)
        } else {
            (y, x)
        };

        let session_id = self
            .sessions
            .create([
                SeatAssignment {
                    user_id: a.profile.user_id,
                    display_name: a.profile.display_name.clone(),
                },
                SeatAssignment {
                    user_id: b.profile.user_id,
                    display_name: b.profile.display_name.clone(),
                },
            ])
            .await;

        info!(
            session_id = %session_id,
            player_a = a.profile.user_id,
            player_b = b.profile.user_id,
            ?mode,
            "match paired"
        );

        self.deliver_match_found(&a, &b, &session_id).await;
        self.deliver_match_found(&b, &a, &session_id).await;

        broadcast_positions(tickets).await;
    }

    /// Mint `player`'s join credential and push the terminal `match_found`.
    async fn deliver_match_found(
        &self,
        player: &QueueTicket,
        opponent: &QueueTicket,
        session_id: &str,
    ) {
        let join_token = self.join_credentials.mint(JoinClaims {
            user_id: player.profile.user_id,
            display_name: player.profile.display_name.clone(),
            match_session_id: session_id.to_string(),
        });

        let message = ChannelMessage::MatchFound {
            match_session_id: session_id.to_string(),
            join_token,
            opponent: opponent.profile.opponent_info(),
        };

        if let Some(sender) = &player.sender {
            if sender.send(message).await.is_err() {
                // The unconsumed join credential simply expires.
                warn!(
                    user_id = player.profile.user_id,
                    "channel gone before match_found delivery"
                );
            }
        }
    }
}

/// First-compatible-pair-wins: earliest attached ticket of the same mode.
///
/// This is the whole pairing policy; a rating-aware matcher replaces this
/// one function without touching the handoff or credential contracts.
fn find_partner(tickets: &[QueueTicket], mode: QueueMode, exclude: UserId) -> Option<usize> {
    tickets
        .iter()
        .position(|t| t.mode == mode && t.profile.user_id != exclude && t.sender.is_some())
}

/// 1-based rank of the ticket at `idx` among tickets of its mode.
fn mode_position(tickets: &[QueueTicket], idx: usize) -> u32 {
    let mode = tickets[idx].mode;
    tickets[..idx].iter().filter(|t| t.mode == mode).count() as u32 + 1
}

/// Push a `queue_update` to every attached ticket.
async fn broadcast_positions(tickets: &[QueueTicket]) {
    for (idx, ticket) in tickets.iter().enumerate() {
        if let Some(sender) = &ticket.sender {
            let _ = sender
                .send(ChannelMessage::QueueUpdate {
                    position: mode_position(tickets, idx),
                    estimated_wait: DEFAULT_ESTIMATED_WAIT_SECS,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialError;
    use crate::session::SessionConfig;
    use std::time::Duration;

    fn profile(user_id: UserId, name: &str) -> PlayerProfile {
        PlayerProfile {
            user_id,
            display_name: name.into(),
            rating: 1000,
            tier: "silver".into(),
        }
    }

    fn coordinator() -> (
        QueueCoordinator,
        Arc<CredentialStore<ChannelClaims>>,
        Arc<CredentialStore<JoinClaims>>,
        Arc<SessionManager>,
    ) {
        let channel_store = Arc::new(CredentialStore::new(Duration::from_secs(120)));
        let join_store = Arc::new(CredentialStore::new(Duration::from_secs(10)));
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
        let coord = QueueCoordinator::new(channel_store.clone(), join_store.clone(), sessions.clone());
        (coord, channel_store, join_store, sessions)
    }

    #[tokio::test]
    async fn test_join_then_conflict_then_leave_then_rejoin() {
        let (coord, _, _, _) = coordinator();

        let resp = coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();
        assert_eq!(resp.position, 1);
        assert!(matches!(
            coord.join(profile(1, "a"), QueueMode::Ranked).await,
            Err(QueueError::AlreadyQueued)
        ));

        coord.leave(1).await;
        coord.leave(1).await; // idempotent
        assert!(coord.join(profile(1, "a"), QueueMode::Ranked).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_mints_consumable_channel_credential() {
        let (coord, channel_store, _, _) = coordinator();
        let resp = coord.join(profile(1, "a"), QueueMode::Casual).await.unwrap();

        let claims = channel_store.validate(&resp.ws_token).unwrap();
        assert_eq!(claims.user_id, 1);
        assert_eq!(
            channel_store.validate(&resp.ws_token),
            Err(CredentialError::InvalidOrExpired)
        );
    }

    #[tokio::test]
    async fn test_attach_requires_ticket() {
        let (coord, _, _, _) = coordinator();
        let (tx, _rx) = mpsc::channel(8);
        assert_eq!(coord.attach_channel(9, tx).await, Err(QueueError::NotQueued));
    }

    #[tokio::test]
    async fn test_pairing_same_mode() {
        let (coord, _, join_store, sessions) = coordinator();

        coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();
        coord.join(profile(2, "b"), QueueMode::Ranked).await.unwrap();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        coord.attach_channel(1, tx_a).await.unwrap();
        coord.attach_channel(2, tx_b).await.unwrap();

        assert!(matches!(
            rx_a.recv().await,
            Some(ChannelMessage::QueueJoined { position: 1, .. })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ChannelMessage::QueueJoined { position: 2, .. })
        ));

        let (session_a, token_a, opponent_a) = match rx_a.recv().await {
            Some(ChannelMessage::MatchFound {
                match_session_id,
                join_token,
                opponent,
            }) => (match_session_id, join_token, opponent),
            other => panic!("expected match_found, got {:?}", other),
        };
        let (session_b, token_b, opponent_b) = match rx_b.recv().await {
            Some(ChannelMessage::MatchFound {
                match_session_id,
                join_token,
                opponent,
            }) => (match_session_id, join_token, opponent),
            other => panic!("expected match_found, got {:?}", other),
        };

        assert_eq!(session_a, session_b);
        assert_ne!(token_a, token_b);
        assert_eq!(opponent_a.id, 2);
        assert_eq!(opponent_b.id, 1);
        assert!(coord.is_empty().await);
        assert!(sessions.get(&session_a).await.is_some());

        // match_found is terminal: tickets are gone, senders dropped.
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());

        // Each join token is accepted exactly once.
        let claims_a = join_store.validate(&token_a).unwrap();
        assert_eq!(claims_a.user_id, 1);
        assert_eq!(claims_a.match_session_id, session_a);
        assert_eq!(
            join_store.validate(&token_a),
            Err(CredentialError::InvalidOrExpired)
        );
        assert!(join_store.validate(&token_b).is_ok());
    }

    #[tokio::test]
    async fn test_modes_never_pair() {
        let (coord, _, _, sessions) = coordinator();

        coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();
        coord.join(profile(2, "b"), QueueMode::Casual).await.unwrap();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        coord.attach_channel(1, tx_a).await.unwrap();
        coord.attach_channel(2, tx_b).await.unwrap();

        assert!(matches!(
            rx_a.recv().await,
            Some(ChannelMessage::QueueJoined { .. })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ChannelMessage::QueueJoined { .. })
        ));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(coord.len().await, 2);
        assert_eq!(sessions.count().await, 0);
    }

    #[tokio::test]
    async fn test_unattached_ticket_not_paired() {
        let (coord, _, _, _) = coordinator();

        // Ticket 1 never opens its channel; it must not be paired.
        coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();
        coord.join(profile(2, "b"), QueueMode::Ranked).await.unwrap();

        let (tx_b, mut rx_b) = mpsc::channel(8);
        coord.attach_channel(2, tx_b).await.unwrap();

        assert!(matches!(
            rx_b.recv().await,
            Some(ChannelMessage::QueueJoined { position: 2, .. })
        ));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(coord.len().await, 2);
    }

    #[tokio::test]
    async fn test_queue_update_on_leave_ahead() {
        let (coord, _, _, _) = coordinator();

        coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();
        coord.join(profile(2, "b"), QueueMode::Ranked).await.unwrap();

        let (tx_b, mut rx_b) = mpsc::channel(8);
        coord.attach_channel(2, tx_b).await.unwrap();
        assert!(matches!(
            rx_b.recv().await,
            Some(ChannelMessage::QueueJoined { position: 2, .. })
        ));

        coord.leave(1).await;
        assert!(matches!(
            rx_b.recv().await,
            Some(ChannelMessage::QueueUpdate { position: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_detach_is_implicit_leave() {
        let (coord, _, _, _) = coordinator();
        coord.join(profile(1, "a"), QueueMode::Ranked).await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        coord.attach_channel(1, tx).await.unwrap();
        coord.detach_channel(1).await;
        assert!(coord.is_empty().await);

        // Re-join after implicit leave succeeds.
        assert!(coord.join(profile(1, "a"), QueueMode::Ranked).await.is_ok());
    }
}
