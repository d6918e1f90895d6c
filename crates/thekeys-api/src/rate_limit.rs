// Per-gateway request throttle
//
// The gateway firmware destabilizes when requests arrive too close
// together, and heavy operations (anything that drives or queries the
// physical lock) need much wider spacing than light status polls. Each
// tier is a leaky bucket of one token: callers reserve the next free
// slot under a brief mutex, then sleep outside the lock until their
// slot arrives. Two clients targeting different gateways never contend
// because the state is per-instance.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Request weight class. Determines the minimum spacing enforced
/// before the request may go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Status polls and sync requests. Safe to issue often.
    Light,
    /// Operations that touch the physical lock (open/close/calibrate/
    /// locker status). Historically destabilize the gateway if issued
    /// too frequently.
    Heavy,
}

/// Minimum spacing between consecutive requests on one tier.
struct TierState {
    min_interval: Duration,
    /// The most recently reserved slot. `None` until the first call.
    last_slot: Mutex<Option<Instant>>,
}

impl TierState {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_slot: Mutex::new(None),
        }
    }

    /// Reserve the next free slot. Returns the instant the caller may
    /// proceed at. The lock is held only for the reservation, never
    /// across the wait, so a waiting heavy caller cannot block a light
    /// one and concurrent same-tier callers serialize correctly.
    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut last = self.last_slot.lock().expect("rate limiter lock poisoned");
        let slot = match *last {
            Some(prev) => (prev + self.min_interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}

/// Two-tier throttle owned by a single gateway client instance.
pub struct RateLimiter {
    light: TierState,
    heavy: TierState,
}

impl RateLimiter {
    /// Create a limiter with the given per-tier minimum intervals.
    pub fn new(light_interval: Duration, heavy_interval: Duration) -> Self {
        Self {
            light: TierState::new(light_interval),
            heavy: TierState::new(heavy_interval),
        }
    }

    /// Wait for the next free slot on `tier`, returning the elapsed wait.
    ///
    /// Tiers are independent: a pending heavy wait never delays a light
    /// call on the same instance, and vice versa.
    pub async fn acquire(&self, tier: Tier) -> Duration {
        let state = match tier {
            Tier::Light => &self.light,
            Tier::Heavy => &self.heavy,
        };

        let slot = state.reserve();
        let now = Instant::now();
        if slot <= now {
            return Duration::ZERO;
        }

        let wait = slot - now;
        debug!(?tier, wait_ms = wait.as_millis() as u64, "rate limit: waiting for slot");
        tokio::time::sleep_until(slot).await;
        wait
    }

    /// The configured minimum interval for `tier`.
    pub fn min_interval(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Light => self.light.min_interval,
            Tier::Heavy => self.heavy.min_interval,
        }
    }
}
