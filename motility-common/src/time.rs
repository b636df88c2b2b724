//! Timestamp utilities
//!
//! Session ids, upload name prefixes and cache-busting suffixes are all
//! millisecond timestamps drawn from a [`TokenClock`]. A clock never issues the
//! same value twice: when two requests land in the same millisecond, the
//! second one is bumped forward by one.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

/// Convert seconds to duration, treating zero as "no limit"
pub fn secs_to_timeout(secs: u64) -> Option<std::time::Duration> {
    (secs > 0).then(|| std::time::Duration::from_secs(secs))
}

/// Monotonic millisecond token source
#[derive(Debug, Default)]
pub struct TokenClock {
    last: AtomicI64,
}

impl TokenClock {
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    /// Clock whose first token is at least `last + 1`
    pub const fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Issue the next token: `max(now_ms, last + 1)`
    pub fn next(&self) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now_ms.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}

/// Process-wide token clock
pub fn token_clock() -> &'static TokenClock {
    static CLOCK: OnceLock<TokenClock> = OnceLock::new();
    CLOCK.get_or_init(TokenClock::new)
}

/// Next process-wide unique token, rendered as decimal text
pub fn next_token() -> String {
    token_clock().next().to_string()
}
