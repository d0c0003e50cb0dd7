//! Sliding-window rate limiter shared by all weather fetches. Keeps a FIFO
//! of call timestamps; when the window is full, `acquire` sleeps until the
//! oldest call leaves it.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Reserve one call slot, sleeping as long as the window is saturated.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = calls.front() {
                    if now.duration_since(oldest) >= self.period {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // Window full: sleep until the oldest call expires.
                let oldest = calls[0];
                self.period
                    .saturating_sub(now.duration_since(oldest))
                    .saturating_add(Duration::from_millis(100))
            };
            tokio::time::sleep(wait).await;
        }
    }
}
