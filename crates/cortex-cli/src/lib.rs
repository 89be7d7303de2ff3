pub mod args;
mod handlers;

pub use args::{Cli, Command};

/// Exit codes: 0 success, 2 configuration/environment errors, 1 sync
/// failures.
pub const EXIT_OK: i32 = 0;
pub const EXIT_SYNC_FAILED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

pub fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Sync { target, full } => handlers::sync::handle(&target, full),
        Command::Live => handlers::live::handle(),
        Command::Status => handlers::status::handle(),
    }
}
