pub mod contract;
pub mod error;
pub mod perf;
pub mod pool;
pub mod rate;
pub mod registry;
pub mod retry;
pub mod subprocess;
pub mod watermark;

pub mod aix;
pub mod bird;
pub mod calendar;
pub mod gcontacts;
pub mod gmail;
pub mod imessage;
pub mod nexus;

pub use contract::{SyncAdapter, SyncContext};
pub use error::{Error, Result};
pub use registry::{AdapterSpec, build_adapter};
