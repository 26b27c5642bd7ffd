//! Paddle Arena Server
//!
//! Matchmaking and game-session backend for a realtime two-player paddle
//! game. Players enter a queue, receive a single-use credential for a
//! matchmaking channel, and once paired are handed off to a game session
//! with a second single-use credential.
//!
//! ## Architecture
//!
//! ```text
//!   queue join (request layer)          WebSocket endpoints
//!   ───────────────────────────         ─────────────────────────────
//!   QueueCoordinator::join  ──mints──>  /matchmaking?token=...
//!        │                                   │ queue_joined / queue_update
//!        │ pairing                           │ match_found  (terminal)
//!        ▼                                   ▼
//!   SessionManager::create  ──mints──>  /game?session=...&token=...
//!                                            │ joined / countdown / started
//!                                            │ snapshot fan-out
//!                                            │ reconnect window on drop
//! ```
//!
//! Every credential is minted by a [`credentials::CredentialStore`] and
//! consumed atomically on first presentation.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;

pub use credentials::{ChannelClaims, CredentialError, CredentialStore, JoinClaims};
pub use protocol::{ChannelMessage, ErrorCode, GameClientMessage, GameServerMessage, QueueMode};
pub use queue::{PlayerProfile, QueueCoordinator, QueueError};
pub use server::{GameServer, ServerConfig, ServerError};
pub use session::{MatchSession, SessionManager, SessionState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
