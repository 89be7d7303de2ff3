use std::sync::Mutex;
use std::sync::mpsc::{Receiver, channel};

use cortex_types::CancelToken;

use crate::rate::RateLimiter;

/// Bounded fan-out/fan-in worker pool.
///
/// Spawns up to `workers` scoped threads that pull items from a shared
/// queue, run `work`, and send results back. Results arrive in completion
/// order, not input order. The optional limiter gates each item; retry
/// logic stays with the caller's `work` function.
pub fn fan_out<I, O, F>(
    items: Vec<I>,
    workers: usize,
    limiter: Option<&RateLimiter>,
    cancel: &CancelToken,
    work: F,
) -> Vec<O>
where
    I: Send,
    O: Send,
    F: Fn(I) -> O + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.max(1).min(items.len());
    let expected = items.len();

    let (item_tx, item_rx) = channel::<I>();
    for item in items {
        let _ = item_tx.send(item);
    }
    drop(item_tx);
    let item_rx = Mutex::new(item_rx);

    let (out_tx, out_rx) = channel::<O>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let out_tx = out_tx.clone();
            let item_rx = &item_rx;
            let work = &work;
            scope.spawn(move || {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let item = match next_item(item_rx) {
                        Some(item) => item,
                        None => break,
                    };
                    if let Some(limiter) = limiter
                        && !limiter.acquire(cancel)
                    {
                        break;
                    }
                    if out_tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);

        let mut results = Vec::with_capacity(expected);
        while let Ok(out) = out_rx.recv() {
            results.push(out);
        }
        results
    })
}

fn next_item<I>(rx: &Mutex<Receiver<I>>) -> Option<I> {
    rx.lock().ok()?.recv().ok()
}
