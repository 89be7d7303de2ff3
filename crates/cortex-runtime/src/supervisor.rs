//! Live supervisor: one thread per watcher plus one per managed upstream
//! child. A small state machine over (running, error, stopped) driven by
//! the cancellation token, with exponential restart backoff.

use std::time::Duration;

use cortex_store::Store;
use cortex_types::{CancelToken, LiveStatus};

use crate::child::{UpstreamChild, UpstreamOptions};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::paths;
use crate::watchers::fs::FsWatcher;
use crate::watchers::webhook::WebhookWatcher;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default interval at which watchers must call `beat`.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

pub struct WatchContext<'a> {
    pub cancel: &'a CancelToken,
    pub store: &'a Store,
    /// Marks the watcher alive; must be called at least every heartbeat
    /// interval.
    pub beat: &'a dyn Fn(),
}

/// A supervised live watcher: a name, the adapters it drives, and a
/// blocking `run` that only returns on failure or cancellation.
pub trait Watcher: Send {
    fn name(&self) -> &str;
    fn adapters(&self) -> Vec<String>;
    fn run(&mut self, ctx: &WatchContext<'_>) -> Result<()>;
}

pub fn set_live_status(store: &Store, adapters: &[String], status: LiveStatus) {
    for adapter in adapters {
        if let Err(err) = store.set_adapter_state(adapter, cortex_store::LIVE_STATUS, status.as_str())
        {
            tracing::warn!(adapter, %err, "cannot write live status");
        }
    }
}

pub fn beat_now(store: &Store, adapters: &[String]) {
    let now = cortex_types::now_ts().to_string();
    for adapter in adapters {
        let _ = store.set_adapter_state(adapter, cortex_store::LIVE_LAST_HEARTBEAT, &now);
    }
}

pub fn record_live_error(store: &Store, adapters: &[String], message: &str) {
    tracing::error!(adapters = ?adapters, error = %message, "live error");
    for adapter in adapters {
        let _ = store.set_adapter_state(adapter, cortex_store::LIVE_LAST_ERROR, message);
    }
}

/// Per-watcher lifecycle: running → (error, backoff, restart)* → stopped.
pub fn supervise(store: &Store, watcher: &mut dyn Watcher, cancel: &CancelToken) {
    let adapters = watcher.adapters();
    let mut backoff = INITIAL_BACKOFF;

    while !cancel.is_cancelled() {
        set_live_status(store, &adapters, LiveStatus::Running);
        beat_now(store, &adapters);

        let beat_adapters = adapters.clone();
        let beat = move || beat_now(store, &beat_adapters);
        let ctx = WatchContext {
            cancel,
            store,
            beat: &beat,
        };

        let outcome = watcher.run(&ctx);

        if cancel.is_cancelled() {
            break;
        }

        // Run returned without cancellation: that is an error either way.
        let message = match outcome {
            Ok(()) => format!("watcher {} returned unexpectedly", watcher.name()),
            Err(err) => err.to_string(),
        };
        set_live_status(store, &adapters, LiveStatus::Error);
        record_live_error(store, &adapters, &message);
        for adapter in &adapters {
            let _ = store.increment_adapter_state(adapter, cortex_store::LIVE_RESTARTS);
        }

        if !cancel.sleep(backoff) {
            break;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    set_live_status(store, &adapters, LiveStatus::Stopped);
}

pub struct Supervisor {
    store_path: std::path::PathBuf,
    config: Config,
}

impl Supervisor {
    pub fn new(store_path: std::path::PathBuf, config: Config) -> Self {
        Self { store_path, config }
    }

    pub fn from_default_paths(config: Config) -> Result<Self> {
        Ok(Self::new(paths::store_file()?, config))
    }

    /// Build the watcher set from the config and run until cancelled.
    pub fn run(&self, cancel: &CancelToken) -> Result<()> {
        let mut watchers: Vec<Box<dyn Watcher>> = Vec::new();
        let mut children: Vec<UpstreamChild> = Vec::new();

        for (name, entry) in self.config.enabled_adapters() {
            if !entry.live_enabled() {
                continue;
            }
            match entry.kind.as_str() {
                "imessage" | "eve" | "aix" | "nexus" => {
                    watchers.push(Box::new(FsWatcher::from_config(name, entry)?));
                }
                "gogcli" => {
                    watchers.push(Box::new(WebhookWatcher::from_config(name, entry)?));
                }
                other => {
                    tracing::warn!(adapter = %name, kind = %other, "live mode not supported for this adapter type");
                    continue;
                }
            }

            let upstream = entry.live_options().get("upstream").cloned();
            if let Some(upstream) = upstream.filter(|u| !u.is_null()) {
                let options: UpstreamOptions =
                    serde_json::from_value(upstream).map_err(|err| {
                        Error::Config(format!("adapter {name}: invalid upstream options: {err}"))
                    })?;
                children.push(UpstreamChild::new(
                    format!("{name}-upstream"),
                    vec![name.clone()],
                    options,
                ));
            }
        }

        if watchers.is_empty() && children.is_empty() {
            return Err(Error::Config(
                "no live-enabled adapters in the configuration".to_string(),
            ));
        }

        tracing::info!(
            watchers = watchers.len(),
            upstream_children = children.len(),
            "live supervisor starting"
        );

        std::thread::scope(|scope| {
            for mut watcher in watchers.drain(..) {
                let store_path = self.store_path.clone();
                let cancel = cancel.clone();
                std::thread::Builder::new()
                    .name(format!("watch-{}", watcher.name()))
                    .spawn_scoped(scope, move || match Store::open(&store_path) {
                        Ok(store) => supervise(&store, watcher.as_mut(), &cancel),
                        Err(err) => {
                            tracing::error!(watcher = %watcher.name(), err = %format!("{err:#}"), "cannot open store");
                        }
                    })
                    .expect("spawn watcher thread");
            }
            for child in children.drain(..) {
                let store_path = self.store_path.clone();
                let cancel = cancel.clone();
                std::thread::Builder::new()
                    .name("upstream-child".to_string())
                    .spawn_scoped(scope, move || match Store::open(&store_path) {
                        Ok(store) => child.run(&store, &cancel),
                        Err(err) => {
                            tracing::error!(err = %format!("{err:#}"), "cannot open store for upstream child");
                        }
                    })
                    .expect("spawn upstream thread");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingWatcher {
        runs: usize,
    }

    impl Watcher for FailingWatcher {
        fn name(&self) -> &str {
            "failing"
        }

        fn adapters(&self) -> Vec<String> {
            vec!["imessage".to_string()]
        }

        fn run(&mut self, ctx: &WatchContext<'_>) -> Result<()> {
            self.runs += 1;
            (ctx.beat)();
            if self.runs >= 3 {
                // Simulate a watcher that blocks until cancellation.
                while !ctx.cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(20));
                }
                return Ok(());
            }
            Err(Error::InvalidOperation("boom".to_string()))
        }
    }

    #[test]
    fn test_supervise_restart_loop_and_stop() {
        let store = Store::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();
        std::thread::spawn(move || {
            // Two failures back off 2s each; give it time to reach the
            // blocking run, then cancel.
            std::thread::sleep(Duration::from_secs(5));
            cancel_clone.cancel();
        });

        let mut watcher = FailingWatcher { runs: 0 };
        supervise(&store, &mut watcher, &cancel);

        assert_eq!(
            store
                .get_adapter_state("imessage", cortex_store::LIVE_STATUS)
                .unwrap(),
            Some("stopped".to_string())
        );
        let restarts: i64 = store
            .get_adapter_state("imessage", cortex_store::LIVE_RESTARTS)
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(restarts, 2);
        assert_eq!(
            store
                .get_adapter_state("imessage", cortex_store::LIVE_LAST_ERROR)
                .unwrap()
                .unwrap(),
            "Invalid operation: boom"
        );
        assert!(
            store
                .get_adapter_state("imessage", cortex_store::LIVE_LAST_HEARTBEAT)
                .unwrap()
                .is_some()
        );
    }
}
