//! services/dashboard/src/http/rate_limit.rs
//!
//! Sliding-window limiter shared by every request of one client.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Waits until a slot is free in the current window, then takes it.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();
                Self::prune(&mut issued, now, self.window);
                if issued.len() < self.max_requests {
                    issued.push_back(now);
                    return;
                }
                // Full: the oldest entry leaves the window first.
                match issued.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };
            debug!("Rate limit reached, waiting for a free slot");
            sleep_until(wake_at).await;
        }
    }

    /// Takes a slot only if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut issued = self.issued.lock().await;
        let now = Instant::now();
        Self::prune(&mut issued, now, self.window);
        if issued.len() < self.max_requests {
            issued.push_back(now);
            true
        } else {
            false
        }
    }

    pub async fn in_flight_window(&self) -> usize {
        let mut issued = self.issued.lock().await;
        Self::prune(&mut issued, Instant::now(), self.window);
        issued.len()
    }

    fn prune(issued: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = issued.front() {
            if now.duration_since(*front) >= window {
                issued.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        assert_eq!(limiter.in_flight_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_oldest_slot_to_expire() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(limiter.in_flight_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        assert!(limiter.try_acquire().await);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!limiter.try_acquire().await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire().await);
    }
}
