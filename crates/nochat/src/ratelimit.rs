//! Fixed-window per-sender rate limiting, keyed by trust tier.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::trust::TrustTier;

const WINDOW: Duration = Duration::from_secs(60);

/// Per-minute message budgets by tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_per_minute: u32,
    pub per_tier: HashMap<TrustTier, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_minute: 30,
            per_tier: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Budget for a tier. `blocked` is hard-capped at zero regardless
    /// of configuration.
    pub fn limit_for(&self, tier: TrustTier) -> u32 {
        if tier == TrustTier::Blocked {
            return 0;
        }
        self.per_tier.get(&tier).copied().unwrap_or(self.default_per_minute)
    }
}

struct Window {
    count: u32,
    started: Instant,
}

/// Counts messages per (tier, sender) in fixed 60-second windows.
///
/// Keying by tier as well as sender means a promotion mid-window starts
/// the sender on a fresh budget at the new tier.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(TrustTier, String), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one message and report whether it fits the window budget.
    pub fn check(&self, sender_id: &str, tier: TrustTier) -> bool {
        let limit = self.config.limit_for(tier);
        if limit == 0 {
            return false;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows
            .entry((tier, sender_id.to_string()))
            .or_insert(Window { count: 0, started: now });

        if now.duration_since(window.started) > WINDOW {
            window.count = 0;
            window.started = now;
        }
        window.count += 1;

        let allowed = window.count <= limit;
        if !allowed {
            debug!(sender_id, tier = %tier, count = window.count, limit, "rate limit exceeded");
        }
        allowed
    }

    #[cfg(test)]
    fn backdate(&self, sender_id: &str, tier: TrustTier, age: Duration) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(window) = windows.get_mut(&(tier, sender_id.to_string())) {
            window.started = Instant::now() - age;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn limiter(default: u32, per_tier: &[(TrustTier, u32)]) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            default_per_minute: default,
            per_tier: per_tier.iter().copied().collect(),
        })
    }

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = limiter(3, &[]);
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(!limiter.check("a", TrustTier::Untrusted));
    }

    #[test]
    fn window_expiry_resets_budget() {
        let limiter = limiter(2, &[]);
        assert!(limiter.check("a", TrustTier::Trusted));
        assert!(limiter.check("a", TrustTier::Trusted));
        assert!(!limiter.check("a", TrustTier::Trusted));

        limiter.backdate("a", TrustTier::Trusted, Duration::from_secs(61));
        assert!(limiter.check("a", TrustTier::Trusted));
    }

    #[test]
    fn senders_have_independent_windows() {
        let limiter = limiter(1, &[]);
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(!limiter.check("a", TrustTier::Untrusted));
        assert!(limiter.check("b", TrustTier::Untrusted));
    }

    #[test]
    fn per_tier_limit_overrides_default() {
        let limiter = limiter(30, &[(TrustTier::Untrusted, 1)]);
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(!limiter.check("a", TrustTier::Untrusted));
        // Same sender at a higher tier gets the default budget.
        assert!(limiter.check("a", TrustTier::Trusted));
        assert!(limiter.check("a", TrustTier::Trusted));
    }

    #[test]
    fn blocked_is_always_denied() {
        // Even an explicit per-tier entry cannot open the blocked tier.
        let limiter = limiter(30, &[(TrustTier::Blocked, 100)]);
        assert!(!limiter.check("a", TrustTier::Blocked));
    }

    #[test]
    fn promotion_mid_window_starts_fresh_budget() {
        let limiter = limiter(2, &[]);
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(limiter.check("a", TrustTier::Untrusted));
        assert!(!limiter.check("a", TrustTier::Untrusted));
        // New tier, new window key.
        assert!(limiter.check("a", TrustTier::Sandboxed));
    }
}
