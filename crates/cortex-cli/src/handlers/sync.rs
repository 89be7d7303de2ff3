use owo_colors::OwoColorize;

use cortex_runtime::SyncContext;
use cortex_runtime::orchestrator::{AdapterRun, SyncOneOutcome, sync_all, sync_one};

use super::bootstrap;
use crate::{EXIT_CONFIG, EXIT_OK, EXIT_SYNC_FAILED};

pub fn handle(target: &str, full: bool) -> i32 {
    let (config, store, cancel) = match bootstrap() {
        Ok(parts) => parts,
        Err(code) => return code,
    };
    let ctx = SyncContext::new(cancel);

    if target == "all" {
        let report = match sync_all(&ctx, &store, &config, full) {
            Ok(report) => report,
            Err(err) => {
                eprintln!("Error: {err}");
                return if err.is_config() {
                    EXIT_CONFIG
                } else {
                    EXIT_SYNC_FAILED
                };
            }
        };
        for run in &report.runs {
            print_run(run);
        }
        if report.ok() { EXIT_OK } else { EXIT_SYNC_FAILED }
    } else {
        match sync_one(&ctx, &store, &config, target, full) {
            Ok(SyncOneOutcome::Ran(run)) => {
                print_run(&run);
                if run.ok() { EXIT_OK } else { EXIT_SYNC_FAILED }
            }
            Ok(SyncOneOutcome::UnknownAdapter(name)) => {
                eprintln!("Error: no adapter named '{name}' in the configuration");
                EXIT_CONFIG
            }
            Ok(SyncOneOutcome::Disabled(name)) => {
                eprintln!("Error: adapter '{name}' is disabled");
                EXIT_CONFIG
            }
            Err(err) => {
                eprintln!("Error: {err}");
                if err.is_config() {
                    EXIT_CONFIG
                } else {
                    EXIT_SYNC_FAILED
                }
            }
        }
    }
}

fn print_run(run: &AdapterRun) {
    match &run.outcome {
        Ok(result) => {
            println!(
                "{} {} events +{}/~{}, threads +{}, attachments +{}, reactions +{}, persons +{} ({:.2?})",
                "✓".green(),
                run.adapter.bold(),
                result.events_created,
                result.events_updated,
                result.threads_created,
                result.attachments_created,
                result.reactions_created,
                result.persons_created,
                result.duration,
            );
            for (phase, elapsed) in &result.perf {
                println!("    {} {}", phase.dimmed(), elapsed.dimmed());
            }
        }
        Err(message) => {
            println!("{} {} {}", "✗".red(), run.adapter.bold(), message.red());
        }
    }
}
