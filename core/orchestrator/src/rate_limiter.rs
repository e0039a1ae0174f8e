//! Per-user, per-endpoint sliding-window rate limiting over the KV service.
//!
//! Keys follow `rl:{endpoint}:{user_id}:{window_seconds}`. A request is
//! admitted only when every window is under its role's ceiling. The limiter
//! fails open: if the backing store misbehaves the KV layer degrades to its
//! in-memory fallback and admission continues.

use crate::kv_service::KvStore;
use platform::record_counter;
use shared_types::{RateLimitsConfig, RateWindow, Role, UserId};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the tightest window.
    pub remaining: u32,
    /// Unix time when the violated (or tightest) window resets.
    pub reset_epoch: i64,
    /// Transport surfaces this as a retry-after hint, seconds.
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    kv: Arc<KvStore>,
    limits: RateLimitsConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<KvStore>, limits: RateLimitsConfig) -> Self {
        Self { kv, limits }
    }

    pub async fn check(&self, user_id: UserId, endpoint: &str, role: Role) -> RateDecision {
        if role == Role::Admin && self.limits.bypass_admin {
            return RateDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_epoch: 0,
                retry_after_secs: 0,
            };
        }

        let now = chrono::Utc::now().timestamp();
        let mut tightest_remaining = u32::MAX;
        let mut tightest_reset = now;

        for window in RateWindow::ALL {
            let limit = self.limits.limit_for(role, window);
            let key = format!("rl:{}:{}:{}", endpoint, user_id, window.as_str());
            let (count, ttl) = self.kv.incr_with_window(&key, window.seconds()).await;

            let reset_epoch = now + ttl as i64;
            if count > u64::from(limit) {
                record_counter("rate_limit_denials_total", 1);
                return RateDecision {
                    allowed: false,
                    remaining: 0,
                    reset_epoch,
                    retry_after_secs: ttl.max(1),
                };
            }

            let remaining = limit - count as u32;
            if remaining < tightest_remaining {
                tightest_remaining = remaining;
                tightest_reset = reset_epoch;
            }
        }

        RateDecision {
            allowed: true,
            remaining: tightest_remaining,
            reset_epoch: tightest_reset,
            retry_after_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(KvStore::in_memory(), RateLimitsConfig::default())
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let rl = limiter();
        // Student per-minute limit defaults to 10.
        for i in 0..10 {
            let d = rl.check(1, "submit_turn", Role::Student).await;
            assert!(d.allowed, "request {i} should be admitted");
        }
        let denied = rl.check(1, "submit_turn", Role::Student).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
        assert!(denied.retry_after_secs <= 60);
        assert!(denied.reset_epoch >= chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let rl = limiter();
        let first = rl.check(2, "submit_turn", Role::Student).await;
        let second = rl.check(2, "submit_turn", Role::Student).await;
        assert!(first.remaining > second.remaining);
    }

    #[tokio::test]
    async fn users_and_endpoints_are_isolated() {
        let rl = limiter();
        for _ in 0..10 {
            rl.check(3, "submit_turn", Role::Student).await;
        }
        assert!(!rl.check(3, "submit_turn", Role::Student).await.allowed);
        // A different user is unaffected.
        assert!(rl.check(4, "submit_turn", Role::Student).await.allowed);
        // The same user on another endpoint is unaffected.
        assert!(rl.check(3, "get_session_state", Role::Student).await.allowed);
    }

    #[tokio::test]
    async fn counsellors_have_their_own_ceiling() {
        let rl = limiter();
        for i in 0..30 {
            let d = rl.check(5, "submit_turn", Role::Counsellor).await;
            assert!(d.allowed, "counsellor request {i} should pass");
        }
        assert!(!rl.check(5, "submit_turn", Role::Counsellor).await.allowed);
    }

    #[tokio::test]
    async fn admin_bypass_skips_counting() {
        let rl = limiter();
        for _ in 0..100 {
            assert!(rl.check(6, "submit_turn", Role::Admin).await.allowed);
        }
    }

    #[tokio::test]
    async fn admin_without_bypass_uses_counsellor_limits() {
        let mut limits = RateLimitsConfig::default();
        limits.bypass_admin = false;
        let rl = RateLimiter::new(KvStore::in_memory(), limits);
        for _ in 0..30 {
            assert!(rl.check(7, "submit_turn", Role::Admin).await.allowed);
        }
        assert!(!rl.check(7, "submit_turn", Role::Admin).await.allowed);
    }
}
