//! Per-provider sliding-window rate limiter.


use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_minute: HashMap<String, u32>,
    pub default_requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: HashMap::new(),
            default_requests_per_minute: 60,
        }
    }
}

struct Window {
    timestamps: Mutex<VecDeque<Instant>>,
    limit: u32,
}

/// Sliding-window limiter with one bucket per provider name.
///
/// `acquire()` is mutually exclusive per provider: only one caller evicts
/// and checks a provider's window at a time, since the window itself is
/// guarded by a single lock.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, std::sync::Arc<Window>>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn window_for(&self, provider: &str) -> std::sync::Arc<Window> {
        let mut windows = self.windows.lock();
        if let Some(w) = windows.get(provider) {
            return std::sync::Arc::clone(w);
        }
        let limit = *self
            .config
            .requests_per_minute
            .get(provider)
            .unwrap_or(&self.config.default_requests_per_minute);
        let window = std::sync::Arc::new(Window {
            timestamps: Mutex::new(VecDeque::new()),
            limit,
        });
        windows.insert(provider.to_string(), std::sync::Arc::clone(&window));
        window
    }

    /// Blocks until a slot is available for `provider`, then records the
    /// timestamp and returns. Timestamps older than 60s are evicted on every
    /// call, so the window is always a true rolling 60s count.
    pub async fn acquire(&self, provider: &str) {
        let window = self.window_for(provider);
        loop {
            let wait = {
                let mut timestamps = window.timestamps.lock();
                let now = Instant::now();
                while let Some(&front) = timestamps.front() {
                    if now.duration_since(front) >= WINDOW {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < window.limit as usize {
                    timestamps.push_back(now);
                    None
                } else {
                    let oldest = *timestamps.front().expect("len >= limit > 0 implies non-empty");
                    Some(WINDOW.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return,
                Some(delay) => sleep(delay).await,
            }
        }
    }

    /// Number of timestamps currently recorded for `provider` within the
    /// rolling window (for diagnostics/tests).
    pub fn current_count(&self, provider: &str) -> usize {
        let window = self.window_for(provider);
        let mut timestamps = window.timestamps.lock();
        let now = Instant::now();
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= WINDOW {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        timestamps.len()
    }
}
