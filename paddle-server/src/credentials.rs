//! Single-Use Credentials
//!
//! Short-lived, single-use tokens gate each leg of the matchmaking-to-game
//! handoff: a channel credential admits one matchmaking channel connection,
//! a join credential admits one game-session join. Consumption is an atomic
//! check-and-remove, so two concurrent presentations of the same token can
//! never both succeed.

use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::protocol::UserId;

/// Number of random bytes per token (hex-encoded on the wire).
const TOKEN_BYTES: usize = 32;

/// Time source, injected so expiry is testable with a fake clock.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time source used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Credential validation failure.
///
/// Absence, prior consumption, and expiry are collapsed into a single kind;
/// distinguishing them would leak information to an unauthenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Token absent, already consumed, or past expiry.
    #[error("invalid or expired token")]
    InvalidOrExpired,
}

/// Payload of a channel credential: admits one matchmaking channel open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelClaims {
    /// The queued player.
    pub user_id: UserId,
}

/// Payload of a join credential: admits one game-session join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClaims {
    /// The matched player.
    pub user_id: UserId,
    /// Display name forwarded to the session.
    pub display_name: String,
    /// The session this credential joins.
    pub match_session_id: String,
}

struct Entry<P> {
    payload: P,
    expires_at: Instant,
}

/// In-memory store of single-use, time-boxed credentials.
///
/// Expiry is evaluated lazily at validation time; an expired entry found
/// during lookup is removed on that same lookup, so no token is ever
/// revalidated after a first `validate` call, successful or not.
pub struct CredentialStore<P> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry<P>>>,
}

impl<P> CredentialStore<P> {
    /// Create a store with the given time-to-live, using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a store with an injected clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a credential for `payload` and return its opaque token.
    pub fn mint(&self, payload: P) -> String {
        let token = generate_token();
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(token.clone(), Entry { payload, expires_at });
        token
    }

    /// Atomically consume `token`, returning its payload if still valid.
    ///
    /// The entry is removed whether the lookup succeeds or finds it expired,
    /// which is what enforces single-use semantics uniformly.
    pub fn validate(&self, token: &str) -> Result<P, CredentialError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .remove(token)
            .ok_or(CredentialError::InvalidOrExpired)?;
        if now >= entry.expires_at {
            return Err(CredentialError::InvalidOrExpired);
        }
        Ok(entry.payload)
    }

    /// Number of outstanding (unconsumed) credentials, expired or not.
    pub fn outstanding(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
