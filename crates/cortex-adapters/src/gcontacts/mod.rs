//! Contacts adapter. Three phases: paginated list, parallel detail fetch
//! behind a worker pool + token bucket, then a sequential merge pass. The
//! merge pass is deliberately not wrapped in one giant transaction:
//! identity merges are transactional themselves and would nest.

use serde::Deserialize;

use cortex_store::Store;
use cortex_types::SyncResult;

use crate::contract::{SyncAdapter, SyncContext, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::pool::fan_out;
use crate::rate::RateLimiter;
use crate::retry::retry_rate_limited;
use crate::subprocess::CliRunner;

// --- wire types ---

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactsPage {
    pub contacts: Vec<ContactStub>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStub {
    pub resource_name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDetail {
    pub resource_name: String,
    pub names: Vec<NameField>,
    pub email_addresses: Vec<ValueField>,
    pub phone_numbers: Vec<ValueField>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NameField {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueField {
    pub value: Option<String>,
}

impl ContactDetail {
    fn display_name(&self) -> Option<&str> {
        self.names.iter().find_map(|n| n.display_name.as_deref())
    }
}

/// Seam over the external contacts CLI.
pub trait ContactsSource: Send + Sync {
    fn list(&self, page_token: Option<&str>) -> Result<ContactsPage>;
    fn get(&self, resource_name: &str) -> Result<ContactDetail>;
}

pub struct GogContacts {
    runner: CliRunner,
}

impl GogContacts {
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

impl ContactsSource for GogContacts {
    fn list(&self, page_token: Option<&str>) -> Result<ContactsPage> {
        let mut args = vec!["contacts", "list"];
        if let Some(token) = page_token {
            args.push("--page-token");
            args.push(token);
        }
        Ok(self.runner.run_json(&args)?.unwrap_or_default())
    }

    fn get(&self, resource_name: &str) -> Result<ContactDetail> {
        let detail: Option<ContactDetail> =
            self.runner.run_json(&["contacts", "get", resource_name])?;
        detail.ok_or_else(|| Error::Upstream(format!("{resource_name}: empty response")))
    }
}

fn default_bin() -> String {
    "gog".to_string()
}
fn default_workers() -> usize {
    64
}
fn default_qps() -> f64 {
    80.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactsOptions {
    #[serde(default = "default_bin")]
    pub bin: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_qps")]
    pub qps: f64,
}

impl Default for ContactsOptions {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            account: None,
            workers: default_workers(),
            qps: default_qps(),
        }
    }
}

pub struct ContactsAdapter {
    name: String,
    options: ContactsOptions,
    source: Box<dyn ContactsSource>,
}

impl ContactsAdapter {
    pub fn new(name: String, options: ContactsOptions) -> Self {
        let source = GogContacts::new(&options.bin, options.account.as_deref());
        Self {
            name,
            options,
            source: Box::new(source),
        }
    }

    pub fn with_source(
        name: String,
        options: ContactsOptions,
        source: Box<dyn ContactsSource>,
    ) -> Self {
        Self {
            name,
            options,
            source,
        }
    }

    /// Merge one upstream contact into the identity graph.
    fn merge_contact(
        &self,
        store: &Store,
        detail: &ContactDetail,
        result: &mut SyncResult,
    ) -> Result<()> {
        let mut contact_ids = Vec::new();
        let display_name = detail.display_name();

        let emails = detail.email_addresses.iter().filter_map(|v| v.value.as_deref());
        let phones = detail.phone_numbers.iter().filter_map(|v| v.value.as_deref());
        for (identifier_type, raw) in emails
            .map(|v| ("email", v))
            .chain(phones.map(|v| ("phone", v)))
        {
            match cortex_identity::get_or_create_contact(
                store,
                identifier_type,
                raw,
                display_name,
                &self.name,
            ) {
                Ok((contact_id, _)) => contact_ids.push(contact_id),
                Err(err) => {
                    tracing::debug!(adapter = %self.name, %err, "skipping identifier")
                }
            }
        }
        if contact_ids.is_empty() {
            return Ok(());
        }

        // Gather every person already linked to any of these endpoints.
        let mut linked = Vec::new();
        for contact_id in &contact_ids {
            for person_id in cortex_identity::persons_for_contact(store, contact_id)? {
                if !linked.contains(&person_id) {
                    linked.push(person_id);
                }
            }
        }

        let target = if linked.is_empty() {
            let Some(name) = display_name.filter(|n| cortex_identity::is_meaningful_name(n))
            else {
                return Ok(());
            };
            let (person_id, created) = cortex_identity::ensure_person_for_contact(
                store,
                &contact_ids[0],
                name,
                "deterministic",
                1.0,
            )?;
            if created {
                result.persons_created += 1;
            }
            person_id
        } else {
            // The me-person always wins a merge; otherwise keep the
            // earliest-linked person and fold the rest in.
            let me = cortex_identity::me_person(store)?.map(|p| p.id);
            let target = me
                .filter(|id| linked.contains(id))
                .unwrap_or_else(|| linked[0].clone());
            for person_id in &linked {
                if person_id != &target {
                    cortex_identity::merge_persons(store, &target, person_id)?;
                }
            }
            target
        };

        for contact_id in &contact_ids {
            cortex_identity::ensure_person_contact_link(
                store,
                &target,
                contact_id,
                "deterministic",
                1.0,
            )?;
        }
        Ok(())
    }
}

impl SyncAdapter for ContactsAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;

        let mut result = SyncResult::default();
        let mut timer = PhaseTimer::new();

        timer.phase("list");
        let mut stubs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            ctx.checkpoint()?;
            let page = self.source.list(page_token.as_deref())?;
            stubs.extend(page.contacts);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        timer.phase("fetch");
        let limiter = RateLimiter::new(self.options.qps);
        let source = self.source.as_ref();
        let cancel = &ctx.cancel;
        let fetched = fan_out(
            stubs,
            self.options.workers,
            Some(&limiter),
            cancel,
            |stub| {
                let detail = retry_rate_limited(cancel, || source.get(&stub.resource_name));
                (stub.resource_name, detail)
            },
        );

        timer.phase("merge");
        for (resource_name, fetch) in fetched {
            ctx.checkpoint()?;
            match fetch {
                Ok(detail) => self.merge_contact(store, &detail, &mut result)?,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(adapter = %self.name, resource_name, %err, "detail fetch failed, skipping");
                }
            }
        }

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}
