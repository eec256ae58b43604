//! Expiry Module
//!
//! Defines the absolute expiry instant recorded for each TTL-tracked key.

use std::time::{Duration, Instant};

// == Expiry ==
/// Absolute point in time after which a key is no longer readable.
///
/// Uses the monotonic clock, so wall-clock adjustments never resurrect or
/// prematurely expire an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Expiry {
    /// Deadline, None = the TTL overflowed the clock and the key never expires
    deadline: Option<Instant>,
}

impl Expiry {
    // == Constructors ==
    /// Creates an expiry `ttl` from now.
    ///
    /// A zero TTL yields an expiry that is already reached.
    pub(crate) fn after(ttl: Duration) -> Self {
        Self::after_from(Instant::now(), ttl)
    }

    /// Creates an expiry `ttl` after `start`.
    pub(crate) fn after_from(start: Instant, ttl: Duration) -> Self {
        Self {
            deadline: start.checked_add(ttl),
        }
    }

    // == Is Expired ==
    /// Checks whether the expiry has been reached.
    ///
    /// Boundary condition: a key is expired once the current time is greater
    /// than or equal to the deadline.
    pub(crate) fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks whether the expiry has been reached at `now`.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining lifetime.
    ///
    /// - `Duration::ZERO` once expired
    /// - `Duration::MAX` if the key never expires
    pub(crate) fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}
