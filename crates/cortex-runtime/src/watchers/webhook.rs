//! Webhook-triggered watcher (Gmail live mode). A small hand-parsed HTTP
//! listener accepts POST/PUT pings, optionally bearer-authenticated, and
//! schedules debounced incremental syncs. The listener thread only sends
//! triggers; all store access stays on the watcher thread.

use std::sync::mpsc::channel;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use cortex_adapters::{AdapterSpec, SyncContext};
use cortex_types::CancelToken;

use crate::config::AdapterEntry;
use crate::error::{Error, Result};
use crate::orchestrator::run_spec;
use crate::supervisor::{WatchContext, Watcher};
use crate::watchers::debounce::DebouncedRunner;

const MAX_HEAD_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: u64 = 256 * 1024;

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8788
}
fn default_path() -> String {
    "/hooks/gmail".to_string()
}
fn default_debounce_secs() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookLiveOptions {
    pub bind: String,
    pub port: u16,
    pub path: String,
    /// Optional bearer token, accepted from `Authorization: Bearer <t>`
    /// or `?token=<t>`.
    pub token: Option<String>,
    pub debounce_secs: f64,
    /// Tolerated but unused here; upstream child options are read by the
    /// supervisor.
    pub upstream: Option<serde_json::Value>,
}

impl Default for WebhookLiveOptions {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            path: default_path(),
            token: None,
            debounce_secs: default_debounce_secs(),
            upstream: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    MethodNotAllowed,
    NotFound,
    Unauthorized,
}

impl Decision {
    fn status_line(&self) -> &'static str {
        match self {
            Decision::Accept => "200 OK",
            Decision::MethodNotAllowed => "405 Method Not Allowed",
            Decision::NotFound => "404 Not Found",
            Decision::Unauthorized => "401 Unauthorized",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            Decision::Accept => "ok\n",
            Decision::MethodNotAllowed => "method not allowed\n",
            Decision::NotFound => "not found\n",
            Decision::Unauthorized => "unauthorized\n",
        }
    }
}

/// Pure request gate: method, then path, then token.
pub fn evaluate_request(
    method: &str,
    target: &str,
    expected_path: &str,
    token: Option<&str>,
    auth_header: Option<&str>,
) -> Decision {
    if !matches!(method, "POST" | "PUT") {
        return Decision::MethodNotAllowed;
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    if path != expected_path {
        return Decision::NotFound;
    }

    let Some(expected_token) = token else {
        return Decision::Accept;
    };

    let from_query = query.and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    });
    if from_query == Some(expected_token) {
        return Decision::Accept;
    }

    if let Some(auth) = auth_header
        && let Some((scheme, value)) = auth.trim().split_once(' ')
        && scheme.eq_ignore_ascii_case("bearer")
        && value.trim() == expected_token
    {
        return Decision::Accept;
    }
    Decision::Unauthorized
}

pub struct WebhookWatcher {
    name: String,
    spec: AdapterSpec,
    options: WebhookLiveOptions,
}

impl WebhookWatcher {
    pub fn from_config(adapter_name: &str, entry: &AdapterEntry) -> Result<Self> {
        let options: WebhookLiveOptions =
            serde_json::from_value(entry.live_options()).map_err(|err| {
                Error::Config(format!("adapter {adapter_name}: invalid live options: {err}"))
            })?;
        Ok(Self {
            name: format!("{adapter_name}-webhook"),
            spec: entry.spec(adapter_name),
            options,
        })
    }
}

impl Watcher for WebhookWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapters(&self) -> Vec<String> {
        vec![self.spec.name.clone()]
    }

    fn run(&mut self, ctx: &WatchContext<'_>) -> Result<()> {
        let (tx, rx) = channel();
        let bind = format!("{}:{}", self.options.bind, self.options.port);
        let path = self.options.path.clone();
        let token = self.options.token.clone();
        let cancel = ctx.cancel.clone();
        let watcher_name = self.name.clone();

        std::thread::scope(|scope| {
            let listener_handle = std::thread::Builder::new()
                .name(format!("{watcher_name}-http"))
                .spawn_scoped(scope, move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(Error::Io)?;
                    runtime.block_on(serve(&bind, &path, token.as_deref(), &cancel, &tx))
                })
                .expect("spawn webhook listener");

            // One initial sync, then debounced trigger-driven syncs.
            let sync_ctx = SyncContext::new(ctx.cancel.clone());
            run_spec(&sync_ctx, ctx.store, &self.spec, false);

            let runner =
                DebouncedRunner::new(Duration::from_secs_f64(self.options.debounce_secs.max(0.0)));
            runner.run_loop(
                &rx,
                ctx.cancel,
                || (ctx.beat)(),
                || {
                    run_spec(&sync_ctx, ctx.store, &self.spec, false);
                },
            );

            match listener_handle.join() {
                Ok(result) => result,
                Err(_) => Err(Error::InvalidOperation(
                    "webhook listener thread panicked".to_string(),
                )),
            }
        })
    }
}

async fn serve(
    bind: &str,
    path: &str,
    token: Option<&str>,
    cancel: &CancelToken,
    tx: &std::sync::mpsc::Sender<()>,
) -> Result<()> {
    let listener = TcpListener::bind(bind).await.map_err(Error::Io)?;
    tracing::info!(bind, path, "webhook listener up");

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                match handle_conn(stream, path, token).await {
                    Ok(Decision::Accept) => {
                        let _ = tx.send(());
                    }
                    Ok(decision) => {
                        tracing::debug!(%peer, ?decision, "webhook request rejected");
                    }
                    Err(err) => {
                        tracing::debug!(%peer, %err, "webhook request failed");
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}

async fn handle_conn(
    mut stream: TcpStream,
    expected_path: &str,
    token: Option<&str>,
) -> std::io::Result<Decision> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    let body_start;

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before headers",
            ));
        }
        head.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_header_end(&head) {
            body_start = pos;
            break;
        }
        if head.len() > MAX_HEAD_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }

    let head_text = String::from_utf8_lossy(&head[..body_start]);
    let mut lines = head_text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    let mut auth_header = None;
    let mut content_length: u64 = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("authorization") {
                auth_header = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
        }
    }

    let decision = evaluate_request(method, target, expected_path, token, auth_header.as_deref());

    // Drain and discard up to 256 KB of body so the peer can finish
    // writing before we close.
    let already = (head.len() - body_start) as u64;
    let mut remaining = content_length.min(MAX_BODY_BYTES).saturating_sub(already);
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        let n = stream.read(&mut buf[..take]).await?;
        if n == 0 {
            break;
        }
        remaining -= n as u64;
    }

    let body = decision.body();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        decision.status_line(),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(decision)
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_gate() {
        assert_eq!(
            evaluate_request("GET", "/hooks/gmail", "/hooks/gmail", None, None),
            Decision::MethodNotAllowed
        );
        assert_eq!(
            evaluate_request("POST", "/hooks/gmail", "/hooks/gmail", None, None),
            Decision::Accept
        );
        assert_eq!(
            evaluate_request("PUT", "/hooks/gmail", "/hooks/gmail", None, None),
            Decision::Accept
        );
    }

    #[test]
    fn test_path_gate() {
        assert_eq!(
            evaluate_request("POST", "/other", "/hooks/gmail", None, None),
            Decision::NotFound
        );
    }

    #[test]
    fn test_token_via_header_and_query() {
        let token = Some("s3cret");
        assert_eq!(
            evaluate_request("POST", "/h", "/h", token, Some("Bearer s3cret")),
            Decision::Accept
        );
        // Case-insensitive scheme prefix.
        assert_eq!(
            evaluate_request("POST", "/h", "/h", token, Some("bearer s3cret")),
            Decision::Accept
        );
        assert_eq!(
            evaluate_request("POST", "/h?token=s3cret", "/h", token, None),
            Decision::Accept
        );
        assert_eq!(
            evaluate_request("POST", "/h?token=wrong", "/h", token, None),
            Decision::Unauthorized
        );
        assert_eq!(
            evaluate_request("POST", "/h", "/h", token, None),
            Decision::Unauthorized
        );
        assert_eq!(
            evaluate_request("POST", "/h", "/h", token, Some("Basic s3cret")),
            Decision::Unauthorized
        );
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"POST / HTTP/1.1\r\n\r\nbody"), Some(19));
        assert_eq!(find_header_end(b"partial\r\n"), None);
    }
}
