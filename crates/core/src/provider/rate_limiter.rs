//! Sliding-window rate limiter for per-provider request throttling.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

/// Length of the rate limiting window.
const WINDOW: Duration = Duration::from_secs(60);

/// Rate limit status for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub requests_per_minute: u32,
    /// Requests admitted within the current window.
    pub requests_in_window: u32,
    /// Time until a slot frees up, if the window is full.
    pub next_available_in_ms: Option<u64>,
}

tokio::task_local! {
    static THROTTLE: Arc<ThrottleClock>;
}

/// Time one call has spent held back by rate limiters.
///
/// A limiter charges its waits to the clock of the call it runs under (see
/// [`ThrottleClock::scope`]). Overlapping waits inside one call, such as a
/// fan-out of lookups, are counted once.
#[derive(Debug, Default)]
pub struct ThrottleClock {
    state: std::sync::Mutex<ThrottleState>,
}

#[derive(Debug, Default)]
struct ThrottleState {
    waiting: u32,
    since: Option<Instant>,
    total: Duration,
}

impl ThrottleClock {
    /// Run `future` with every limiter wait inside it charged to this clock.
    pub fn scope<F: Future>(self: Arc<Self>, future: F) -> impl Future<Output = F::Output> {
        THROTTLE.scope(self, future)
    }

    /// Total time spent waiting, including a wait still in progress.
    pub fn throttled(&self) -> Duration {
        let state = self.lock();
        match state.since {
            Some(since) => state.total + since.elapsed(),
            None => state.total,
        }
    }

    fn begin(&self) {
        let mut state = self.lock();
        if state.waiting == 0 {
            state.since = Some(Instant::now());
        }
        state.waiting += 1;
    }

    fn end(&self) {
        let mut state = self.lock();
        state.waiting = state.waiting.saturating_sub(1);
        if state.waiting == 0 {
            if let Some(since) = state.since.take() {
                state.total += since.elapsed();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the current call as throttled until dropped.
struct ThrottledWait(Option<Arc<ThrottleClock>>);

impl ThrottledWait {
    fn enter() -> Self {
        let clock = THROTTLE.try_with(Arc::clone).ok();
        if let Some(clock) = &clock {
            clock.begin();
        }
        Self(clock)
    }
}

impl Drop for ThrottledWait {
    fn drop(&mut self) {
        if let Some(clock) = &self.0 {
            clock.end();
        }
    }
}

/// Sliding one-minute window limiter.
///
/// Admission is FIFO: the window lock is held while waiting for a slot, and
/// tokio's mutex queues waiters in arrival order.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    name: String,
    /// Max requests per window (0 = unlimited).
    max_requests: u32,
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `requests_per_minute` requests per minute.
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            name: name.into(),
            max_requests: requests_per_minute,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether this limiter never blocks.
    pub fn is_unlimited(&self) -> bool {
        self.max_requests == 0
    }

    /// Wait for a slot in the window, then record the request.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }

        let started = Instant::now();
        // Queueing behind other callers counts as throttled time too.
        let _throttled = ThrottledWait::enter();
        let mut requests = self.requests.lock().await;

        loop {
            let now = Instant::now();
            prune(&mut requests, now);

            if (requests.len() as u32) < self.max_requests {
                requests.push_back(now);
                return now.duration_since(started);
            }

            // Window is full: wait for the oldest entry to age out.
            if let Some(oldest) = requests.front().copied() {
                let wait = (oldest + WINDOW).saturating_duration_since(now);
                debug!("{} rate limit: waiting {:?}", self.name, wait);
                sleep(wait).await;
            }
        }
    }

    /// Get the current rate limit status.
    pub async fn status(&self) -> RateLimitStatus {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        prune(&mut requests, now);

        let full = !self.is_unlimited() && requests.len() as u32 >= self.max_requests;
        RateLimitStatus {
            requests_per_minute: self.max_requests,
            requests_in_window: requests.len() as u32,
            next_available_in_ms: if full {
                requests.front().map(|oldest| {
                    (*oldest + WINDOW).saturating_duration_since(now).as_millis() as u64
                })
            } else {
                None
            },
        }
    }
}

/// Drop timestamps older than the window.
fn prune(requests: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = requests.front() {
        if now.duration_since(*front) >= WINDOW {
            requests.pop_front();
        } else {
            break;
        }
    }
}
