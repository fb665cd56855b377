//! Fixed-window request limiter. Callers over the limit wait for the next
//! window instead of being rejected.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use skycast_core::RateLimitSettings;
use tokio::time::Instant;

#[derive(Debug)]
struct Window {
    request_count: u32,
    window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Arc<Mutex<Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Arc::new(Mutex::new(Window {
                request_count: 0,
                window_start: Instant::now(),
            })),
        }
    }

    /// Requests already counted in the current window.
    pub fn used(&self) -> u32 {
        self.state.lock().request_count
    }

    /// Take one slot, waiting for the window to roll over when it is full.
    pub async fn acquire(&self) {
        loop {
            let wait = self.try_acquire();
            match wait {
                None => return,
                Some(wait) => {
                    tracing::debug!("Rate limit of {} reached, waiting {:?}", self.limit, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// `None` when a slot was taken, otherwise how long until the window
    /// resets.
    fn try_acquire(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.window_start);

        if elapsed >= self.window {
            state.request_count = 0;
            state.window_start = now;
        }

        if state.request_count >= self.limit {
            return Some(self.window.saturating_sub(elapsed));
        }

        state.request_count += 1;
        None
    }
}

impl From<&RateLimitSettings> for RateLimiter {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.requests, settings.window())
    }
}
