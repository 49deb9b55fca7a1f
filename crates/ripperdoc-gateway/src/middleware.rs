//! Gateway middleware.

use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

/// Checks between sweeps of keys whose quota has fully replenished.
const SWEEP_EVERY: u64 = 1024;

/// Per-email limiter for login attempts.
///
/// Keys are normalized emails, so attempts against one account cannot be
/// spread across spellings of its address. Keys that are back to a full
/// quota are dropped periodically, so spraying distinct emails cannot grow
/// the table without bound.
pub struct LoginRateLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
    checks: AtomicU64,
}

impl LoginRateLimiter {
    /// Create a limiter allowing `attempts_per_minute` per email.
    #[must_use]
    pub fn new(attempts_per_minute: NonZeroU32) -> Self {
        Self::with_clock(attempts_per_minute, DefaultClock::default())
    }
}

impl<C: Clock> LoginRateLimiter<C> {
    /// Create a limiter driven by `clock`.
    #[must_use]
    pub fn with_clock(attempts_per_minute: NonZeroU32, clock: C) -> Self {
        Self {
            limiter: RateLimiter::new(
                Quota::per_minute(attempts_per_minute),
                DefaultKeyedStateStore::default(),
                clock,
            ),
            checks: AtomicU64::new(0),
        }
    }

    /// Record an attempt; `false` once the email is over its quota.
    #[must_use]
    pub fn check(&self, email: &str) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
        self.limiter.check_key(&email.to_string()).is_ok()
    }

    /// Forget emails whose quota has fully replenished.
    pub fn sweep(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::debug!(before, after = self.limiter.len(), "Swept login rate limiter");
    }

    /// Number of emails currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

impl<C: Clock> std::fmt::Debug for LoginRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRateLimiter")
            .field("tracked_keys", &self.limiter.len())
            .finish()
    }
}
