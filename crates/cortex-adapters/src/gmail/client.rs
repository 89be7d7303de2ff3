use crate::error::Result;
use crate::subprocess::CliRunner;

use super::schema::{GmailProfile, GmailThread, HistoryPage, SearchPage};

/// Seam over the external Gmail CLI. Production uses [`GogGmail`]; tests
/// inject fixture sources.
pub trait GmailSource: Send + Sync {
    fn search(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage>;
    fn get_thread(&self, thread_id: &str) -> Result<GmailThread>;
    fn profile(&self) -> Result<GmailProfile>;
    fn history(&self, start_history_id: &str, page_token: Option<&str>) -> Result<HistoryPage>;
}

pub struct GogGmail {
    runner: CliRunner,
}

impl GogGmail {
    pub fn new(bin: &str, account: Option<&str>) -> Self {
        let mut base_args = Vec::new();
        if let Some(account) = account {
            base_args.push("--account".to_string());
            base_args.push(account.to_string());
        }
        Self {
            runner: CliRunner::new(bin).with_base_args(base_args),
        }
    }
}

impl GmailSource for GogGmail {
    fn search(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage> {
        let mut args = vec!["gmail", "search", query];
        if let Some(token) = page_token {
            args.push("--page-token");
            args.push(token);
        }
        Ok(self.runner.run_json(&args)?.unwrap_or_default())
    }

    fn get_thread(&self, thread_id: &str) -> Result<GmailThread> {
        let thread: Option<GmailThread> =
            self.runner.run_json(&["gmail", "thread", "get", thread_id])?;
        thread.ok_or_else(|| {
            crate::error::Error::Upstream(format!("thread {thread_id}: empty response"))
        })
    }

    fn profile(&self) -> Result<GmailProfile> {
        Ok(self
            .runner
            .run_json(&["gmail", "profile"])?
            .unwrap_or_default())
    }

    fn history(&self, start_history_id: &str, page_token: Option<&str>) -> Result<HistoryPage> {
        let mut args = vec!["gmail", "history", start_history_id];
        if let Some(token) = page_token {
            args.push("--page-token");
            args.push(token);
        }
        Ok(self.runner.run_json(&args)?.unwrap_or_default())
    }
}
