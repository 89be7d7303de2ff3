//! Trigger coalescing for webhook-driven syncs. A burst of triggers runs
//! one sync; further triggers inside the window are folded into at most
//! one follow-up run. Because the runner executes syncs inline on its own
//! loop, overlapping syncs per adapter are impossible by construction.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use cortex_types::CancelToken;

const TICK: Duration = Duration::from_millis(500);

pub struct DebouncedRunner {
    window: Duration,
}

impl DebouncedRunner {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Consume triggers until cancellation. `on_tick` fires roughly every
    /// 500 ms regardless of traffic (heartbeats); `run` executes one sync
    /// pass.
    pub fn run_loop(
        &self,
        rx: &Receiver<()>,
        cancel: &CancelToken,
        mut on_tick: impl FnMut(),
        mut run: impl FnMut(),
    ) {
        let mut next_allowed = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match rx.recv_timeout(TICK) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    on_tick();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }

            // Inside the window: hold until it closes, folding any
            // further triggers into this one run.
            let now = Instant::now();
            if now < next_allowed && !cancel.sleep(next_allowed - now) {
                return;
            }
            while rx.try_recv().is_ok() {}

            run();
            next_allowed = Instant::now() + self.window;
        }
    }
}
