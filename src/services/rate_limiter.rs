//! Sign-in throttling
//!
//! - 5 failed attempts per username per 15 minutes
//! - 10 attempts per client IP per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Events per key inside a trailing time window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let events = self.events.read().await;
        events
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        events.len()
    }
}

pub struct LoginRateLimiter {
    usernames: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            usernames: SlidingWindow::new(5, Duration::minutes(15)),
            ips: SlidingWindow::new(10, Duration::minutes(1)),
        }
    }

    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames.is_limited(&username.to_lowercase(), Utc::now()).await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames.record(username.to_lowercase(), Utc::now()).await;
    }

    /// Forget failures after a successful sign-in
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(&ip, Utc::now()).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip, Utc::now()).await;
    }

    /// Drop expired entries; returns how many keys are still tracked
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        self.usernames.prune(now).await + self.ips.prune(now).await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
