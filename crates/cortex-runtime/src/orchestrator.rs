//! One-shot sync dispatch. Iterates the enabled adapters, records
//! per-adapter job status, and never lets one failure abort the others.

use cortex_adapters::{AdapterSpec, SyncContext, build_adapter};
use cortex_store::Store;
use cortex_types::SyncResult;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug)]
pub struct AdapterRun {
    pub adapter: String,
    pub outcome: std::result::Result<SyncResult, String>,
}

impl AdapterRun {
    pub fn ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub runs: Vec<AdapterRun>,
}

impl SyncReport {
    /// Aggregated success: AND of the per-adapter outcomes.
    pub fn ok(&self) -> bool {
        self.runs.iter().all(AdapterRun::ok)
    }
}

#[derive(Debug)]
pub enum SyncOneOutcome {
    Ran(AdapterRun),
    UnknownAdapter(String),
    Disabled(String),
}

/// Link the configured owner identities to the me-person before adapters
/// run, so deterministic links are in place for their merges.
pub fn seed_me_from_config(store: &Store, config: &Config) -> Result<()> {
    let Some(me) = &config.me else {
        return Ok(());
    };
    let (person_id, _) = cortex_identity::ensure_me_person(store, &me.canonical_name)?;
    for identity in &me.identities {
        let contact = cortex_identity::get_or_create_contact(
            store,
            &identity.kind,
            &identity.value,
            Some(&me.canonical_name),
            "config",
        );
        match contact {
            Ok((contact_id, _)) => {
                cortex_identity::ensure_person_contact_link(
                    store,
                    &person_id,
                    &contact_id,
                    "user",
                    1.0,
                )?;
            }
            Err(err) => {
                tracing::warn!(kind = %identity.kind, %err, "skipping configured identity");
            }
        }
    }
    Ok(())
}

/// Run one adapter spec, recording SyncJob transitions
/// (running → completed | error).
pub fn run_spec(ctx: &SyncContext, store: &Store, spec: &AdapterSpec, full: bool) -> AdapterRun {
    let name = spec.name.clone();
    if let Err(err) = store.sync_job_start(&name) {
        return AdapterRun {
            adapter: name,
            outcome: Err(format!("{err:#}")),
        };
    }

    let outcome = match build_adapter(spec) {
        Ok(adapter) => adapter.sync(ctx, store, full).map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
    };

    match &outcome {
        Ok(result) => {
            let progress = serde_json::json!({
                "events_created": result.events_created,
                "events_updated": result.events_updated,
                "threads_created": result.threads_created,
                "perf": result.perf,
            });
            if let Err(err) = store.sync_job_complete(&name, Some(&progress.to_string())) {
                tracing::warn!(adapter = %name, %err, "failed to record job completion");
            }
            tracing::info!(
                adapter = %name,
                events_created = result.events_created,
                events_updated = result.events_updated,
                duration = ?result.duration,
                "sync completed"
            );
        }
        Err(message) => {
            if let Err(err) = store.sync_job_fail(&name, message) {
                tracing::warn!(adapter = %name, %err, "failed to record job error");
            }
            tracing::error!(adapter = %name, error = %message, "sync failed");
        }
    }

    AdapterRun {
        adapter: name,
        outcome,
    }
}

/// Sync every enabled adapter. Per-adapter failures are recorded and the
/// loop continues; the report's `ok()` is the AND of all outcomes.
pub fn sync_all(
    ctx: &SyncContext,
    store: &Store,
    config: &Config,
    full: bool,
) -> Result<SyncReport> {
    seed_me_from_config(store, config)?;

    let mut report = SyncReport::default();
    for (name, entry) in config.enabled_adapters() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        report.runs.push(run_spec(ctx, store, &entry.spec(name), full));
    }
    Ok(report)
}

/// Sync a single named adapter. Unknown and disabled names return typed
/// outcomes without invoking any adapter.
pub fn sync_one(
    ctx: &SyncContext,
    store: &Store,
    config: &Config,
    name: &str,
    full: bool,
) -> Result<SyncOneOutcome> {
    let Some(entry) = config.get(name) else {
        return Ok(SyncOneOutcome::UnknownAdapter(name.to_string()));
    };
    if !entry.enabled {
        return Ok(SyncOneOutcome::Disabled(name.to_string()));
    }

    seed_me_from_config(store, config)?;
    Ok(SyncOneOutcome::Ran(run_spec(
        ctx,
        store,
        &entry.spec(name),
        full,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn nexus_config(dir: &TempDir) -> Config {
        let yaml = format!(
            "adapters:\n  nexus:\n    type: nexus\n    options:\n      dir: {}\n  broken:\n    type: nexus\n    options:\n      dir: {}/missing\n  off:\n    type: bird\n    enabled: false\n",
            dir.path().display(),
            dir.path().display(),
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn write_log(dir: &TempDir) {
        let mut f = std::fs::File::create(dir.path().join("log.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"id":"e1","session_id":"s1","content":"hello","ts":100}}"#
        )
        .unwrap();
    }

    #[test]
    fn test_sync_all_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write_log(&dir);
        let config = nexus_config(&dir);
        let store = Store::open_in_memory().unwrap();

        let report = sync_all(&SyncContext::default(), &store, &config, false).unwrap();
        // Disabled adapters are not run at all.
        assert_eq!(report.runs.len(), 2);
        assert!(!report.ok());

        let good = report.runs.iter().find(|r| r.adapter == "nexus").unwrap();
        assert!(good.ok());
        assert_eq!(good.outcome.as_ref().unwrap().events_created, 1);

        let bad = report.runs.iter().find(|r| r.adapter == "broken").unwrap();
        assert!(!bad.ok());

        // Job rows reflect both outcomes.
        assert_eq!(
            store.get_sync_job("nexus").unwrap().unwrap().status,
            "completed"
        );
        let failed = store.get_sync_job("broken").unwrap().unwrap();
        assert_eq!(failed.status, "error");
        assert!(failed.last_error.unwrap().contains("missing"));
    }

    #[test]
    fn test_sync_one_typed_outcomes() {
        let dir = TempDir::new().unwrap();
        write_log(&dir);
        let config = nexus_config(&dir);
        let store = Store::open_in_memory().unwrap();
        let ctx = SyncContext::default();

        match sync_one(&ctx, &store, &config, "nope", false).unwrap() {
            SyncOneOutcome::UnknownAdapter(name) => assert_eq!(name, "nope"),
            other => panic!("expected unknown, got {other:?}"),
        }
        match sync_one(&ctx, &store, &config, "off", false).unwrap() {
            SyncOneOutcome::Disabled(name) => assert_eq!(name, "off"),
            other => panic!("expected disabled, got {other:?}"),
        }
        match sync_one(&ctx, &store, &config, "nexus", false).unwrap() {
            SyncOneOutcome::Ran(run) => assert!(run.ok()),
            other => panic!("expected ran, got {other:?}"),
        }
    }

    #[test]
    fn test_me_is_seeded_from_config() {
        let dir = TempDir::new().unwrap();
        write_log(&dir);
        let mut config = nexus_config(&dir);
        config.me = Some(crate::config::MeConfig {
            canonical_name: "Ada Lovelace".to_string(),
            identities: vec![crate::config::IdentityEntry {
                kind: "email".to_string(),
                value: "ada@example.com".to_string(),
            }],
        });

        let store = Store::open_in_memory().unwrap();
        sync_all(&SyncContext::default(), &store, &config, false).unwrap();

        let me = cortex_identity::me_person(&store).unwrap().unwrap();
        assert_eq!(me.canonical_name, "Ada Lovelace");
        let (contact_id, created) =
            cortex_identity::get_or_create_contact(&store, "email", "ada@example.com", None, "t")
                .unwrap();
        assert!(!created);
        assert_eq!(
            cortex_identity::persons_for_contact(&store, &contact_id).unwrap(),
            vec![me.id]
        );
    }
}
