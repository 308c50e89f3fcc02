//! WebSocket connection management for the live client
//!
//! Tracks connection state and schedules reconnects at a fixed delay. The
//! client retries forever; there is no "gave up" state.

use std::time::{Duration, Instant};

/// Connection state enum
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Connected to the server
    Connected,
    /// Not connected; the next attempt is due at `next_retry`
    Retrying { attempt: u32, next_retry: Instant },
}

impl ConnectionState {
    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Consecutive failed attempts (0 when connected)
    pub fn attempt(&self) -> u32 {
        match self {
            ConnectionState::Retrying { attempt, .. } => *attempt,
            ConnectionState::Connected => 0,
        }
    }
}

/// Connection state machine with a fixed reconnect delay.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    delay: Duration,
}

impl Connection {
    /// A connection that has not connected yet; the first attempt is due now.
    pub fn new(delay: Duration, now: Instant) -> Self {
        Self {
            state: ConnectionState::Retrying {
                attempt: 0,
                next_retry: now,
            },
            delay,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
    }

    /// Record a dropped connection or failed attempt. Returns how long to
    /// wait before the next attempt.
    pub fn on_disconnected(&mut self, now: Instant) -> Duration {
        let attempt = self.state.attempt().saturating_add(1);
        self.state = ConnectionState::Retrying {
            attempt,
            next_retry: now + self.delay,
        };
        self.delay
    }

    /// Time left until the next attempt, zero if due or connected.
    pub fn wait_time(&self, now: Instant) -> Duration {
        match self.state {
            ConnectionState::Retrying { next_retry, .. } => next_retry.saturating_duration_since(now),
            ConnectionState::Connected => Duration::ZERO,
        }
    }
}
