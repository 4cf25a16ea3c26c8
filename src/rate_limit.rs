// Rate limiting for bid attempts
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Per-user sliding-window quota. Counts attempts, not accepted bids.
///
/// The window state lives behind a shared handle keyed by user id, so
/// swapping the in-process map for an external counter store (KV with
/// TTL) does not change any caller.
pub struct SlidingWindowLimiter {
    windows: Arc<Mutex<HashMap<u64, VecDeque<i64>>>>,
    max_attempts: u32,
    window_ms: i64,
}

impl SlidingWindowLimiter {
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_attempts,
            window_ms: (window_secs * 1000) as i64,
        }
    }

    /// Record an attempt at `now_ms` and check it against the quota.
    pub fn check(&self, user_id: u64, now_ms: i64) -> Result<(), RateLimitError> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(user_id).or_default();

        // Drop attempts that slid out of the window
        let cutoff = now_ms - self.window_ms;
        while window.front().map(|&t| t <= cutoff).unwrap_or(false) {
            window.pop_front();
        }

        if window.len() >= self.max_attempts as usize {
            let oldest = *window.front().unwrap_or(&now_ms);
            let retry_after_ms = (oldest + self.window_ms - now_ms).max(0);
            return Err(RateLimitError {
                user_id,
                retry_after_secs: ((retry_after_ms + 999) / 1000).max(1) as u64,
            });
        }

        window.push_back(now_ms);
        Ok(())
    }

    pub fn remaining_quota(&self, user_id: u64, now_ms: i64) -> u32 {
        let windows = self.windows.lock().unwrap();
        let used = windows
            .get(&user_id)
            .map(|w| w.iter().filter(|&&t| t > now_ms - self.window_ms).count())
            .unwrap_or(0);
        self.max_attempts.saturating_sub(used as u32)
    }

    /// Reset rate limit for user (admin function)
    pub fn reset_user(&self, user_id: u64) {
        let mut windows = self.windows.lock().unwrap();
        windows.remove(&user_id);
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub user_id: u64,
    pub retry_after_secs: u64,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit exceeded for user {}. Retry after {} seconds",
            self.user_id, self.retry_after_secs
        )
    }
}

impl std::error::Error for RateLimitError {}
