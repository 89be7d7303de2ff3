use std::sync::Mutex;
use std::time::{Duration, Instant};

use cortex_types::CancelToken;

/// Token-bucket rate limiter shared by the workers of one adapter pool.
///
/// Refills at `qps` tokens per second with a burst capacity of one
/// second's worth of tokens. Waiters sleep in ticks of at least 10 ms so
/// cancellation is observed promptly.
pub struct RateLimiter {
    qps: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

const MIN_TICK: Duration = Duration::from_millis(10);

impl RateLimiter {
    pub fn new(qps: f64) -> Self {
        let qps = qps.max(0.1);
        Self {
            qps,
            state: Mutex::new(BucketState {
                tokens: qps.max(1.0),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available. Returns false if cancelled first.
    pub fn acquire(&self, cancel: &CancelToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.qps).min(self.qps.max(1.0));
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.qps)
            };
            std::thread::sleep(wait.max(MIN_TICK));
        }
    }
}
