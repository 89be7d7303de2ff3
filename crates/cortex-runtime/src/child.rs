//! Managed upstream child processes (e.g. a fetcher CLI's own serve
//! mode). At most one managed instance per PID file: a live foreign
//! instance is treated as healthy and polled instead of competed with.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use cortex_store::Store;
use cortex_types::CancelToken;

use crate::pidfile;
use crate::supervisor::record_live_error;

fn default_already_running_exit_code() -> i32 {
    3
}
fn default_external_check_interval_secs() -> u64 {
    30
}

/// Upstream child configuration, from the adapter's live options.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamOptions {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    pub pid_file: PathBuf,
    /// The upstream's "I am already running, that's fine" exit code.
    #[serde(default = "default_already_running_exit_code")]
    pub already_running_exit_code: i32,
    #[serde(default = "default_external_check_interval_secs")]
    pub external_check_interval_secs: u64,
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct UpstreamChild {
    watcher_name: String,
    adapters: Vec<String>,
    options: UpstreamOptions,
}

impl UpstreamChild {
    pub fn new(watcher_name: String, adapters: Vec<String>, options: UpstreamOptions) -> Self {
        Self {
            watcher_name,
            adapters,
            options,
        }
    }

    /// Spawn-wait-recover loop. Runs until the token is cancelled.
    pub fn run(&self, store: &Store, cancel: &CancelToken) {
        let mut backoff = INITIAL_BACKOFF;
        let external_interval = Duration::from_secs(self.options.external_check_interval_secs);

        while !cancel.is_cancelled() {
            // A live PID file that answers the probe means a foreign
            // instance owns the upstream; poll it instead of competing.
            if let Some(pid) = pidfile::read(&self.options.pid_file)
                && pidfile::alive(pid)
            {
                tracing::debug!(
                    watcher = %self.watcher_name,
                    pid,
                    "external upstream instance is healthy"
                );
                if !cancel.sleep(external_interval) {
                    break;
                }
                continue;
            }

            let mut command = Command::new(&self.options.command);
            command
                .args(&self.options.args)
                .envs(&self.options.env)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            if let Some(cwd) = &self.options.cwd {
                command.current_dir(cwd);
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    let message = format!("spawn {} failed: {err}", self.options.command);
                    record_live_error(store, &self.adapters, &message);
                    if !cancel.sleep(backoff) {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            let pid = child.id();
            if let Err(err) = pidfile::write(&self.options.pid_file, pid) {
                tracing::warn!(watcher = %self.watcher_name, %err, "cannot write pid file");
            }
            for adapter in &self.adapters {
                let _ = store.set_adapter_state(adapter, cortex_store::LIVE_LAST_ERROR, "");
            }
            tracing::info!(watcher = %self.watcher_name, pid, "upstream child started");

            let status = loop {
                if cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    pidfile::remove_if_matches(&self.options.pid_file, pid);
                    return;
                }
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => std::thread::sleep(Duration::from_millis(500)),
                    Err(err) => break Err(err),
                }
            };

            pidfile::remove_if_matches(&self.options.pid_file, pid);

            match status {
                Ok(status) if status.code() == Some(self.options.already_running_exit_code) => {
                    // Same polling branch as a detected foreign instance.
                    tracing::info!(
                        watcher = %self.watcher_name,
                        "upstream reports an instance is already running"
                    );
                    if !cancel.sleep(external_interval) {
                        break;
                    }
                    backoff = INITIAL_BACKOFF;
                }
                Ok(status) => {
                    let message = format!("upstream child exited with {status}");
                    record_live_error(store, &self.adapters, &message);
                    if !cancel.sleep(backoff) {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => {
                    let message = format!("wait on upstream child failed: {err}");
                    record_live_error(store, &self.adapters, &message);
                    if !cancel.sleep(backoff) {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
