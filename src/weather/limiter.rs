//! Sliding-window rate limiter shared by all fetch workers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Bounds the number of requests issued in any trailing 60-second window.
///
/// The window of issue timestamps is re-pruned on every acquire, so this is
/// a true sliding window rather than a quota that resets at clock
/// boundaries. The mutex is never held across an await.
pub struct RateLimiter {
    max_per_window: usize,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until a request slot is free within the window, then claims it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().unwrap();
                let now = Instant::now();

                while issued
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= WINDOW)
                {
                    issued.pop_front();
                }

                if issued.len() < self.max_per_window {
                    issued.push_back(now);
                    return;
                }

                // Window is full; the oldest entry is guaranteed younger
                // than WINDOW after pruning.
                let oldest = *issued.front().unwrap();
                WINDOW - now.duration_since(oldest)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests currently inside the window.
    pub fn in_flight_window(&self) -> usize {
        let mut issued = self.issued.lock().unwrap();
        let now = Instant::now();
        while issued
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            issued.pop_front();
        }
        issued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_quota_delays_next_call_until_window_slides() {
        let limiter = RateLimiter::new(550);
        let start = Instant::now();

        for _ in 0..550 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight_window(), 550);

        // The 551st call must wait until the first timestamp is >60s old
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_rather_than_resetting() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.acquire().await;

        // Full window: the next acquire should release when the first
        // timestamp ages out at t=60, not at t=90.
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_all_complete() {
        let limiter = Arc::new(RateLimiter::new(5));
        let mut tasks = vec![];
        for _ in 0..20 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(limiter.in_flight_window() <= 20);
    }
}
