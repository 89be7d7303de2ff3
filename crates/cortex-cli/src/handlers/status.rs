use owo_colors::OwoColorize;

use cortex_runtime::snapshot;

use super::bootstrap;
use crate::{EXIT_CONFIG, EXIT_OK};

pub fn handle() -> i32 {
    let (config, store, _cancel) = match bootstrap() {
        Ok(parts) => parts,
        Err(code) => return code,
    };

    let rows = match snapshot(&store, &config) {
        Ok(rows) => rows,
        Err(err) => {
            eprintln!("Error: {err}");
            return EXIT_CONFIG;
        }
    };

    if rows.is_empty() {
        println!("{}", "no adapters configured".dimmed());
        return EXIT_OK;
    }

    for row in rows {
        let live = match row.live_status.as_deref() {
            Some("running") => "running".green().to_string(),
            Some("error") => "error".red().to_string(),
            Some("stopped") => "stopped".yellow().to_string(),
            Some(other) => other.to_string(),
            None => "-".dimmed().to_string(),
        };
        let heartbeat = row
            .heartbeat_age_secs
            .map(|age| format!("{age}s ago"))
            .unwrap_or_else(|| "-".to_string());
        let watermark = row
            .watermark
            .map(|wm| wm.to_string())
            .unwrap_or_else(|| "-".to_string());
        let job = row.job_status.unwrap_or_else(|| "-".to_string());

        let enabled = if row.enabled {
            row.adapter.bold().to_string()
        } else {
            format!("{} (disabled)", row.adapter.dimmed())
        };
        println!(
            "{enabled} [{}] live={live} heartbeat={heartbeat} restarts={} job={job} watermark={watermark}",
            row.kind,
            row.restarts,
        );
        if let Some(error) = row.last_error {
            println!("    {} {}", "last error:".red(), error);
        }
    }
    EXIT_OK
}
