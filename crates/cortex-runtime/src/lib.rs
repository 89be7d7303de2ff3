pub mod child;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod paths;
pub mod pidfile;
pub mod status;
pub mod supervisor;
pub mod watchers;

pub use config::{AdapterEntry, Config, LiveConfig, MeConfig};
pub use cortex_adapters::SyncContext;
pub use error::{Error, Result};
pub use orchestrator::{SyncOneOutcome, SyncReport, sync_all, sync_one};
pub use status::{AdapterStatus, snapshot};
pub use supervisor::{Supervisor, Watcher};
