//! Fixed-window rate limiting
//!
//! A single [`RateLimiterRegistry`] lives for the whole process. Every
//! admission for a key finds the same [`RateWindow`] and mutates it in place;
//! when the clock passes the window end the entry is reset on its next touch
//! rather than replaced by a new allocation. A periodic sweep drops entries
//! that have been idle for [`IDLE_WINDOWS`] window lengths.

use crate::clock::{SharedClock, SystemClock};
use crate::tenant::Tier;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default window length (one minute)
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Windows untouched for this many window lengths are evicted
pub const IDLE_WINDOWS: i64 = 3;

/// Identity a counter is kept for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RateKey {
    Tenant(String),
    /// Caller address on per-IP routes
    Ip(IpAddr),
    /// Caller address on tiered routes when no tenant could be identified
    AnonymousIp(IpAddr),
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "tenant:{}", id),
            Self::Ip(ip) => write!(f, "ip:{}", ip),
            Self::AnonymousIp(ip) => write!(f, "anon-ip:{}", ip),
        }
    }
}

/// How a route's quota is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Fixed quota keyed by caller IP
    PerIp,
    /// Quota from the caller's tenant tier, keyed by tenant
    Tiered,
}

/// Requests allowed per window for each policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub free: u32,
    pub premium: u32,
    pub per_ip: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            free: 10,
            premium: 1000,
            per_ip: 5,
        }
    }
}

impl RateLimits {
    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free,
            Tier::Premium => self.premium,
        }
    }

    /// Resolve the limit for a policy; an unknown tier counts as free
    pub fn resolve(&self, policy: LimitPolicy, tier: Option<Tier>) -> u32 {
        match policy {
            LimitPolicy::PerIp => self.per_ip,
            LimitPolicy::Tiered => self.for_tier(tier.unwrap_or_default()),
        }
    }
}

/// Counter state for one key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub limit: u32,
    /// Aligned down to a multiple of `window_size_ms`
    pub window_start_ms: i64,
    pub window_size_ms: i64,
    pub last_seen_ms: i64,
}

impl RateWindow {
    fn new(now_ms: i64, window_size_ms: i64, limit: u32) -> Self {
        Self {
            count: 0,
            limit,
            window_start_ms: align(now_ms, window_size_ms),
            window_size_ms,
            last_seen_ms: now_ms,
        }
    }

    pub fn window_end_ms(&self) -> i64 {
        self.window_start_ms + self.window_size_ms
    }

    pub fn is_current(&self, now_ms: i64) -> bool {
        now_ms < self.window_end_ms()
    }

    fn hit(&mut self, now_ms: i64, limit: u32) -> Admission {
        if !self.is_current(now_ms) {
            self.window_start_ms = align(now_ms, self.window_size_ms);
            self.count = 0;
        }
        self.limit = limit;
        self.last_seen_ms = now_ms;
        self.count = self.count.saturating_add(1);

        let reset_at = millis_to_datetime(self.window_end_ms());
        if self.count > limit {
            Admission::Rejected { limit, reset_at }
        } else {
            Admission::Admitted {
                limit,
                remaining: limit - self.count,
                reset_at,
            }
        }
    }
}

/// Outcome of an admission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Rejected {
        limit: u32,
        reset_at: DateTime<Utc>,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Self::Admitted { limit, .. } | Self::Rejected { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Self::Admitted { remaining, .. } => *remaining,
            Self::Rejected { .. } => 0,
        }
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        match self {
            Self::Admitted { reset_at, .. } | Self::Rejected { reset_at, .. } => *reset_at,
        }
    }

    /// Whole seconds until the window resets, rounded up
    pub fn reset_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at() - now).num_milliseconds().max(0);
        ((millis + 999) / 1000) as u64
    }
}

/// Process-wide registry of rate windows
pub struct RateLimiterRegistry {
    windows: DashMap<RateKey, RateWindow>,
    window_size_ms: i64,
    clock: SharedClock,
}

impl RateLimiterRegistry {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: SharedClock) -> Self {
        Self {
            windows: DashMap::new(),
            window_size_ms: window.num_milliseconds().max(1),
            clock,
        }
    }

    pub fn window_size(&self) -> Duration {
        Duration::milliseconds(self.window_size_ms)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one request for `key` against `limit`
    pub fn admit(&self, key: &RateKey, limit: u32) -> Admission {
        self.admit_at(key, limit, self.clock.now())
    }

    pub fn admit_at(&self, key: &RateKey, limit: u32, now: DateTime<Utc>) -> Admission {
        let now_ms = now.timestamp_millis();

        // The shard write guard makes increment-and-compare atomic per key.
        if let Some(mut window) = self.windows.get_mut(key) {
            return window.hit(now_ms, limit);
        }

        self.windows
            .entry(key.clone())
            .or_insert_with(|| RateWindow::new(now_ms, self.window_size_ms, limit))
            .hit(now_ms, limit)
    }

    /// Current state of a key's window
    pub fn snapshot(&self, key: &RateKey) -> Option<RateWindow> {
        self.windows.get(key).map(|w| w.value().clone())
    }

    /// Drop windows idle for more than `IDLE_WINDOWS` window lengths
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now.timestamp_millis() - IDLE_WINDOWS * self.window_size_ms;
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            let keep = window.last_seen_ms >= cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Periodically evict idle windows until the registry is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_idle(registry.now());
                if evicted > 0 {
                    tracing::debug!(evicted, live = registry.len(), "Evicted idle rate windows");
                }
            }
        })
    }
}

fn align(now_ms: i64, window_size_ms: i64) -> i64 {
    now_ms - now_ms.rem_euclid(window_size_ms)
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use rstest::rstest;
    use std::sync::Barrier;

    fn start() -> DateTime<Utc> {
        // Aligned to a minute boundary
        DateTime::from_timestamp(1_700_000_040, 0).unwrap()
    }

    fn registry() -> (Arc<ManualClock>, RateLimiterRegistry) {
        let clock = Arc::new(ManualClock::new(start()));
        let registry = RateLimiterRegistry::with_clock(Duration::minutes(1), clock.clone());
        (clock, registry)
    }

    fn tenant(id: &str) -> RateKey {
        RateKey::Tenant(id.to_string())
    }

    #[rstest]
    #[case(LimitPolicy::Tiered, Some(Tier::Premium), 1000)]
    #[case(LimitPolicy::Tiered, Some(Tier::Free), 10)]
    #[case(LimitPolicy::Tiered, None, 10)]
    #[case(LimitPolicy::PerIp, Some(Tier::Premium), 5)]
    #[case(LimitPolicy::PerIp, None, 5)]
    fn test_resolve_limit(#[case] policy: LimitPolicy, #[case] tier: Option<Tier>, #[case] expected: u32) {
        assert_eq!(RateLimits::default().resolve(policy, tier), expected);
    }

    #[test]
    fn test_first_n_admitted_then_rejected() {
        let (_, registry) = registry();
        let key = tenant("a");

        for i in 0..10 {
            let admission = registry.admit(&key, 10);
            assert!(admission.is_admitted(), "request {} should pass", i + 1);
            assert_eq!(admission.remaining(), 10 - (i + 1));
        }

        let rejected = registry.admit(&key, 10);
        assert_eq!(
            rejected,
            Admission::Rejected {
                limit: 10,
                reset_at: start() + Duration::minutes(1)
            }
        );
        assert!(!registry.admit(&key, 10).is_admitted());
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let (clock, registry) = registry();
        let key = tenant("a");

        for _ in 0..6 {
            registry.admit(&key, 5);
        }
        assert!(!registry.admit(&key, 5).is_admitted());

        clock.advance(Duration::seconds(59));
        assert!(!registry.admit(&key, 5).is_admitted());

        clock.advance(Duration::seconds(1));
        let admission = registry.admit(&key, 5);
        assert!(admission.is_admitted());
        assert_eq!(admission.remaining(), 4);

        let window = registry.snapshot(&key).unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.window_start_ms, (start() + Duration::minutes(1)).timestamp_millis());
    }

    #[test]
    fn test_same_window_reused_across_calls() {
        let (_, registry) = registry();
        let key = tenant("a");
        registry.admit(&key, 10);
        registry.admit(&key, 10);
        registry.admit(&key, 10);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(&key).unwrap().count, 3);
    }

    #[test]
    fn test_keys_are_independent() {
        let (_, registry) = registry();
        let ip = RateKey::Ip("10.0.0.1".parse().unwrap());

        for _ in 0..5 {
            assert!(registry.admit(&ip, 5).is_admitted());
        }
        assert!(!registry.admit(&ip, 5).is_admitted());
        assert!(registry.admit(&tenant("a"), 5).is_admitted());
        assert!(registry.admit(&RateKey::Ip("10.0.0.2".parse().unwrap()), 5).is_admitted());
    }

    #[test]
    fn test_same_address_under_different_policies_is_counted_apart() {
        let (_, registry) = registry();
        let addr = "10.0.0.9".parse().unwrap();
        let per_ip = RateKey::Ip(addr);
        let anonymous = RateKey::AnonymousIp(addr);

        for _ in 0..5 {
            registry.admit(&per_ip, 5);
        }
        assert!(!registry.admit(&per_ip, 5).is_admitted());

        let admission = registry.admit(&anonymous, 10);
        assert!(admission.is_admitted());
        assert_eq!(admission.remaining(), 9);
        assert_eq!(registry.snapshot(&per_ip).unwrap().limit, 5);
        assert_ne!(per_ip.to_string(), anonymous.to_string());
    }

    #[test]
    fn test_window_start_is_aligned() {
        let (clock, registry) = registry();
        clock.advance(Duration::seconds(17));
        let admission = registry.admit(&tenant("a"), 1);

        let window = registry.snapshot(&tenant("a")).unwrap();
        assert_eq!(window.window_start_ms, start().timestamp_millis());
        assert_eq!(admission.reset_after_secs(clock.now()), 43);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_limit() {
        let registry = Arc::new(RateLimiterRegistry::new(Duration::minutes(10)));
        let key = tenant("contended");
        let limit = 50;
        let callers = (limit * 2) as usize;
        let barrier = Arc::new(Barrier::new(callers));

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    let key = key.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        registry.admit(&key, limit).is_admitted()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(admitted, limit as usize);
    }

    #[test]
    fn test_evict_idle_windows() {
        let (clock, registry) = registry();
        registry.admit(&tenant("stale"), 10);
        clock.advance(Duration::minutes(2));
        registry.admit(&tenant("fresh"), 10);

        clock.advance(Duration::minutes(1) + Duration::seconds(30));
        let evicted = registry.evict_idle(clock.now());

        assert_eq!(evicted, 1);
        assert!(registry.snapshot(&tenant("stale")).is_none());
        assert!(registry.snapshot(&tenant("fresh")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let clock = Arc::new(ManualClock::new(start()));
        let registry = Arc::new(RateLimiterRegistry::with_clock(Duration::minutes(1), clock.clone()));
        registry.admit(&tenant("a"), 10);

        let handle = registry.spawn_sweeper(std::time::Duration::from_secs(60));
        clock.advance(Duration::minutes(5));
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;

        assert!(registry.is_empty());
        handle.abort();
    }
}
