//! Per-client throttling for the credential endpoints (login, register,
//! password reset request). Windowed counters with a temporary lockout once
//! the window is exhausted; counters live in process memory, sized for a
//! single-instance deployment.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::AuthThrottleConfig;

struct Entry {
    window_start: Instant,
    count: u32,
    locked_until: Option<Instant>,
}

pub struct AuthThrottle {
    enabled: bool,
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl AuthThrottle {
    #[must_use]
    pub fn new(config: &AuthThrottleConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            window: Duration::from_secs(config.window_seconds),
            lockout: Duration::from_secs(config.lockout_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record one attempt for `key` and say whether it may proceed.
    pub fn try_acquire(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Keep the map from growing without bound under scanning traffic.
        if entries.len() > 10_000 {
            let window = self.window;
            entries.retain(|_, e| {
                now.duration_since(e.window_start) < window
                    || e.locked_until.is_some_and(|until| until > now)
            });
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            window_start: now,
            count: 0,
            locked_until: None,
        });

        if let Some(until) = entry.locked_until {
            if until > now {
                return false;
            }
            entry.locked_until = None;
            entry.window_start = now;
            entry.count = 0;
        }

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        if entry.count > self.max_attempts {
            entry.locked_until = Some(now + self.lockout);
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max_attempts: u32) -> AuthThrottle {
        AuthThrottle::new(&AuthThrottleConfig {
            enabled: true,
            max_attempts,
            window_seconds: 60,
            lockout_seconds: 60,
        })
    }

    #[test]
    fn allows_up_to_the_limit_then_locks() {
        let t = throttle(3);

        assert!(t.try_acquire("1.2.3.4"));
        assert!(t.try_acquire("1.2.3.4"));
        assert!(t.try_acquire("1.2.3.4"));
        assert!(!t.try_acquire("1.2.3.4"));
        assert!(!t.try_acquire("1.2.3.4"));
    }

    #[test]
    fn keys_are_independent() {
        let t = throttle(1);

        assert!(t.try_acquire("a"));
        assert!(!t.try_acquire("a"));
        assert!(t.try_acquire("b"));
    }

    #[test]
    fn disabled_throttle_always_allows() {
        let t = AuthThrottle::new(&AuthThrottleConfig {
            enabled: false,
            max_attempts: 1,
            window_seconds: 60,
            lockout_seconds: 60,
        });

        for _ in 0..10 {
            assert!(t.try_acquire("a"));
        }
    }
}
