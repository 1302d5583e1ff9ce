//! Per-principal request rate limiting
//!
//! Fixed-window counters in a sharded map with bounded growth: when a shard
//! exceeds its capacity, expired windows are swept before the new entry is
//! admitted. Shard locks are plain mutexes; critical sections never await.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SHARD_COUNT: usize = 16;
const SHARD_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Sharded fixed-window rate limiter keyed by principal id
pub struct RateLimiter {
    shards: Vec<Mutex<HashMap<String, Window>>>,
    max_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            max_per_window,
            window,
        }
    }

    /// Count one request for `principal`; false when over the limit.
    pub fn check(&self, principal: &str) -> bool {
        let shard = &self.shards[self.shard_index(principal)];
        let mut entries = match shard.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();

        if entries.len() >= SHARD_CAPACITY && !entries.contains_key(principal) {
            let window = self.window;
            entries.retain(|_, w| now.duration_since(w.started) < window);
            // Sweep found nothing to drop; evict the stalest window so the
            // shard never exceeds its capacity.
            if entries.len() >= SHARD_CAPACITY {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, w)| w.started)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }

        let window = entries.entry(principal.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        window.count <= self.max_per_window
    }

    fn shard_index(&self, principal: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        principal.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("user-1"));
        assert!(limiter.check("user-1"));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
    }

    #[test]
    fn test_principals_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
        assert!(limiter.check("user-2"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("user-1"));
        assert!(!limiter.check("user-1"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("user-1"));
    }

    #[test]
    fn test_bounded_under_unique_principal_burst() {
        let limiter = RateLimiter::new(10, Duration::from_secs(3600));
        // No window ever expires here, so only eviction bounds growth
        for i in 0..(SHARD_CAPACITY * SHARD_COUNT * 2) {
            limiter.check(&format!("burst-{}", i));
        }
        for shard in &limiter.shards {
            assert!(shard.lock().unwrap().len() <= SHARD_CAPACITY);
        }
    }

    #[test]
    fn test_default_limits() {
        let limiter = RateLimiter::default();
        assert!(limiter.check("anyone"));
    }
}
