//! Filesystem-triggered watcher: a recursive watch on the parent of the
//! upstream database, suffix filtering, a trailing debounce timer, and
//! one incremental sync per fired timer. One initial sync runs at
//! startup.

use std::path::PathBuf;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher as NotifyWatcher};
use serde::Deserialize;

use cortex_adapters::{AdapterSpec, SyncContext};

use crate::config::AdapterEntry;
use crate::error::{Error, Result};
use crate::orchestrator::run_spec;
use crate::supervisor::{DEFAULT_HEARTBEAT, WatchContext, Watcher};

fn default_debounce_secs() -> f64 {
    2.0
}
fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT.as_secs()
}
fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FsLiveOptions {
    pub debounce_secs: f64,
    pub heartbeat_secs: u64,
    pub poll_interval_ms: u64,
    /// Overrides the suffix filter derived from the adapter type.
    pub suffixes: Vec<String>,
    /// Overrides the watch directory derived from the adapter options.
    pub watch_dir: Option<PathBuf>,
}

impl Default for FsLiveOptions {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            suffixes: Vec::new(),
            watch_dir: None,
        }
    }
}

pub struct FsWatcher {
    name: String,
    spec: AdapterSpec,
    watch_dir: PathBuf,
    suffixes: Vec<String>,
    debounce: Duration,
    heartbeat: Duration,
    poll_interval: Duration,
}

impl FsWatcher {
    pub fn from_config(adapter_name: &str, entry: &AdapterEntry) -> Result<Self> {
        let live: FsLiveOptions =
            serde_json::from_value(entry.live_options()).map_err(|err| {
                Error::Config(format!("adapter {adapter_name}: invalid live options: {err}"))
            })?;
        let spec = entry.spec(adapter_name);

        // Derive the watched path and name filter from the adapter type.
        let (derived_dir, derived_suffixes) = match entry.kind.as_str() {
            "imessage" | "eve" => {
                let db_path = spec
                    .options
                    .get("db_path")
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        dirs::home_dir()
                            .unwrap_or_default()
                            .join("Library/Messages/chat.db")
                    });
                let dir = db_path.parent().map(PathBuf::from).unwrap_or(db_path);
                (dir, vec!["chat.db".to_string()])
            }
            "aix" => {
                let db_path = spec
                    .options
                    .get("db_path")
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        Error::Config(format!("adapter {adapter_name}: aix live mode needs db_path"))
                    })?;
                let suffix = db_path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "sessions.db".to_string());
                let dir = db_path.parent().map(PathBuf::from).unwrap_or(db_path);
                (dir, vec![suffix])
            }
            "nexus" => {
                let dir = spec
                    .options
                    .get("dir")
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        Error::Config(format!("adapter {adapter_name}: nexus live mode needs dir"))
                    })?;
                (dir, vec![".jsonl".to_string()])
            }
            other => {
                return Err(Error::Config(format!(
                    "adapter {adapter_name}: type {other} has no filesystem watcher"
                )));
            }
        };

        Ok(Self {
            name: format!("{adapter_name}-fs"),
            spec,
            watch_dir: live.watch_dir.unwrap_or(derived_dir),
            suffixes: if live.suffixes.is_empty() {
                derived_suffixes
            } else {
                live.suffixes
            },
            debounce: Duration::from_secs_f64(live.debounce_secs.max(0.0)),
            heartbeat: Duration::from_secs(live.heartbeat_secs.max(1)),
            poll_interval: Duration::from_millis(live.poll_interval_ms.max(100)),
        })
    }

    fn matches(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return false;
        }
        event.paths.iter().any(|path| {
            path.file_name()
                .map(|f| f.to_string_lossy())
                .is_some_and(|name| self.suffixes.iter().any(|s| name.contains(s.as_str())))
        })
    }
}

impl Watcher for FsWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapters(&self) -> Vec<String> {
        vec![self.spec.name.clone()]
    }

    fn run(&mut self, ctx: &WatchContext<'_>) -> Result<()> {
        if !self.watch_dir.exists() {
            return Err(Error::Config(format!(
                "watch directory does not exist: {}",
                self.watch_dir.display()
            )));
        }

        let sync_ctx = SyncContext::new(ctx.cancel.clone());

        // Catch up on anything missed while the watcher was down.
        run_spec(&sync_ctx, ctx.store, &self.spec, false);

        let (tx_fs, rx_fs) = channel();
        let config = notify::Config::default().with_poll_interval(self.poll_interval);
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx_fs.send(event);
                }
            },
            config,
        )
        .map_err(|err| Error::InvalidOperation(format!("filesystem watch failed: {err}")))?;
        watcher
            .watch(&self.watch_dir, RecursiveMode::Recursive)
            .map_err(|err| Error::InvalidOperation(format!("filesystem watch failed: {err}")))?;

        let mut fire_at: Option<Instant> = None;
        let mut last_beat = Instant::now();

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }

            match rx_fs.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => {
                    if self.matches(&event) {
                        // Trailing debounce: every burst member pushes the
                        // timer out again.
                        fire_at = Some(Instant::now() + self.debounce);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::InvalidOperation(
                        "filesystem watch channel closed".to_string(),
                    ));
                }
            }

            if last_beat.elapsed() >= self.heartbeat.min(Duration::from_secs(5)) {
                (ctx.beat)();
                last_beat = Instant::now();
            }

            if let Some(deadline) = fire_at
                && Instant::now() >= deadline
            {
                fire_at = None;
                run_spec(&sync_ctx, ctx.store, &self.spec, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_store::Store;
    use cortex_types::CancelToken;
    use std::io::Write;
    use tempfile::TempDir;

    fn entry(dir: &TempDir) -> AdapterEntry {
        serde_yaml::from_str(&format!(
            "type: nexus\nenabled: true\nlive:\n  enabled: true\n  options:\n    debounce_secs: 0.2\n    poll_interval_ms: 100\noptions:\n  dir: {}",
            dir.path().display()
        ))
        .unwrap()
    }

    #[test]
    fn test_from_config_derives_watch_dir_and_suffix() {
        let dir = TempDir::new().unwrap();
        let watcher = FsWatcher::from_config("nexus", &entry(&dir)).unwrap();
        assert_eq!(watcher.watch_dir, dir.path());
        assert_eq!(watcher.suffixes, vec![".jsonl".to_string()]);
        assert_eq!(watcher.adapters(), vec!["nexus".to_string()]);
    }

    #[test]
    fn test_initial_sync_and_debounced_resync() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("log.jsonl")).unwrap();
        writeln!(file, r#"{{"id":"e1","session_id":"s1","content":"one","ts":100}}"#).unwrap();
        file.flush().unwrap();

        let store = Store::open(&dir.path().join("cortex.db")).unwrap();

        let mut watcher = FsWatcher::from_config("nexus", &entry(&dir)).unwrap();
        // Don't watch our own store file.
        assert!(!watcher.suffixes.iter().any(|s| "cortex.db".contains(s.as_str())));

        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();
        let dir_path = dir.path().to_path_buf();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(600));
            let mut file = std::fs::File::options()
                .append(true)
                .open(dir_path.join("log.jsonl"))
                .unwrap();
            writeln!(file, r#"{{"id":"e2","session_id":"s1","content":"two","ts":101}}"#).unwrap();
            file.flush().unwrap();
            std::thread::sleep(Duration::from_secs(2));
            cancel_clone.cancel();
        });

        let beat = || {};
        let ctx = WatchContext {
            cancel: &cancel,
            store: &store,
            beat: &beat,
        };
        watcher.run(&ctx).unwrap();
        writer.join().unwrap();

        // Initial sync picked up e1; the debounced resync picked up e2.
        assert!(store.get_event("nexus:e1").unwrap().is_some());
        assert!(store.get_event("nexus:e2").unwrap().is_some());
    }

    #[test]
    fn test_missing_watch_dir_errors() {
        let dir = TempDir::new().unwrap();
        let entry = entry(&dir);
        let mut watcher = FsWatcher::from_config("nexus", &entry).unwrap();
        watcher.watch_dir = dir.path().join("gone");

        let store = Store::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let beat = || {};
        let ctx = WatchContext {
            cancel: &cancel,
            store: &store,
            beat: &beat,
        };
        assert!(watcher.run(&ctx).is_err());
    }
}
