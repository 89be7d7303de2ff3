use owo_colors::OwoColorize;

use cortex_runtime::Supervisor;

use super::bootstrap;
use crate::{EXIT_CONFIG, EXIT_OK, EXIT_SYNC_FAILED};

pub fn handle() -> i32 {
    let (config, store, cancel) = match bootstrap() {
        Ok(parts) => parts,
        Err(code) => return code,
    };
    // The supervisor's watcher threads each open their own connection.
    drop(store);

    println!("{} live supervisor (Ctrl-C to stop)", "▶".bright_cyan());

    let supervisor = match Supervisor::from_default_paths(config) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            eprintln!("Error: {err}");
            return EXIT_CONFIG;
        }
    };

    match supervisor.run(&cancel) {
        Ok(()) => {
            println!("{} stopped", "■".dimmed());
            EXIT_OK
        }
        Err(err) => {
            eprintln!("Error: {err}");
            if err.is_config() { EXIT_CONFIG } else { EXIT_SYNC_FAILED }
        }
    }
}
