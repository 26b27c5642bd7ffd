//! Reconnection
//!
//! Exponential-backoff reconnect bookkeeping for the game-session socket.
//! The manager holds no timer of its own: callers ask it what to do when a
//! connection drops or an attempt fails, sleep for the returned delay, and
//! report the result back. That keeps every transition testable without
//! waiting on real time.

use std::time::Duration;
use tracing::{debug, warn};

/// Connection state as seen by the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// A reconnect attempt is scheduled or in flight.
    Connecting,
    /// Connection is live.
    Connected,
    /// A fatal error ended reconnection (credential rejected, window closed).
    Error,
}

/// Backoff tuning.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on the per-attempt delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (0-based): base doubled per
    /// attempt, capped at the ceiling.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let ms = base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_millis(ms).min(self.max_delay)
    }
}

/// Reconnect state machine.
#[derive(Debug, Clone)]
pub struct ReconnectManager {
    policy: ReconnectPolicy,
    state: ReconnectState,
    attempt: u32,
}

impl Default for ReconnectManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl ReconnectManager {
    /// Create a manager with the given policy, starting Disconnected.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Disconnected,
            attempt: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Attempts made since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The connection dropped unexpectedly. Returns the delay before the
    /// first reconnect attempt, or `None` if reconnection is not available
    /// from the current state.
    pub fn connection_lost(&mut self) -> Option<Duration> {
        if self.state != ReconnectState::Connected {
            return None;
        }
        self.state = ReconnectState::Connecting;
        self.attempt = 0;
        let delay = self.policy.delay_for(0);
        debug!(?delay, "connection lost, scheduling reconnect");
        Some(delay)
    }

    /// A reconnect attempt failed. Returns the delay before the next
    /// attempt, or `None` when the attempt budget is spent, in which case
    /// the state drops to Disconnected.
    pub fn attempt_failed(&mut self) -> Option<Duration> {
        if self.state != ReconnectState::Connecting {
            return None;
        }
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            warn!(attempts = self.attempt, "reconnect budget exhausted");
            self.state = ReconnectState::Disconnected;
            self.attempt = 0;
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        debug!(attempt = self.attempt, ?delay, "reconnect attempt failed");
        Some(delay)
    }

    /// A connection (initial or resumed) succeeded.
    pub fn connected(&mut self) {
        self.state = ReconnectState::Connected;
        self.attempt = 0;
    }

    /// The server rejected the resume permanently; stop retrying.
    pub fn fatal(&mut self) {
        self.state = ReconnectState::Error;
        self.attempt = 0;
    }

    /// Deliberate disconnect; cancels any pending reconnection.
    pub fn disconnect(&mut self) {
        self.state = ReconnectState::Disconnected;
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_manager() -> ReconnectManager {
        let mut m = ReconnectManager::default();
        m.connected();
        m
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..7).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_huge_attempt_stays_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(63), Duration::from_secs(30));
        assert_eq!(policy.delay_for(200), Duration::from_secs(30));
    }

    #[test]
    fn test_loss_then_success() {
        let mut m = connected_manager();
        assert_eq!(m.connection_lost(), Some(Duration::from_secs(1)));
        assert_eq!(m.state(), ReconnectState::Connecting);

        m.connected();
        assert_eq!(m.state(), ReconnectState::Connected);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_failures_escalate_then_give_up() {
        let mut m = ReconnectManager::new(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        });
        m.connected();
        assert_eq!(m.connection_lost(), Some(Duration::from_secs(1)));
        assert_eq!(m.attempt_failed(), Some(Duration::from_secs(2)));
        assert_eq!(m.attempt_failed(), Some(Duration::from_secs(4)));
        // Third failure spends the budget: quiet Disconnected, not Error.
        assert_eq!(m.attempt_failed(), None);
        assert_eq!(m.state(), ReconnectState::Disconnected);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut m = connected_manager();
        m.connection_lost();
        m.attempt_failed();
        m.attempt_failed();
        m.connected();

        // Next loss starts the ladder from the base again.
        assert_eq!(m.connection_lost(), Some(Duration::from_secs(1)));
        assert_eq!(m.attempt_failed(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_fatal_stops_retrying() {
        let mut m = connected_manager();
        m.connection_lost();
        m.fatal();
        assert_eq!(m.state(), ReconnectState::Error);
        assert_eq!(m.attempt_failed(), None);
    }

    #[test]
    fn test_deliberate_disconnect_cancels() {
        let mut m = connected_manager();
        m.connection_lost();
        m.disconnect();
        assert_eq!(m.state(), ReconnectState::Disconnected);
        assert_eq!(m.attempt_failed(), None);
    }

    #[test]
    fn test_loss_only_from_connected() {
        let mut m = ReconnectManager::default();
        assert_eq!(m.connection_lost(), None);
        m.fatal();
        assert_eq!(m.connection_lost(), None);
    }
}
