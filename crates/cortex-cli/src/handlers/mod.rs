pub mod live;
pub mod status;
pub mod sync;

use cortex_runtime::Config;
use cortex_store::Store;
use cortex_types::CancelToken;

use crate::EXIT_CONFIG;

/// Shared setup: config + store + Ctrl-C wired to a cancellation token.
pub(crate) fn bootstrap() -> Result<(Config, Store, CancelToken), i32> {
    let config = Config::load().map_err(|err| {
        eprintln!("Error: {err}");
        EXIT_CONFIG
    })?;

    let store_path = cortex_runtime::paths::store_file().map_err(|err| {
        eprintln!("Error: {err}");
        EXIT_CONFIG
    })?;
    let store = Store::open(&store_path).map_err(|err| {
        eprintln!("Error: {err:#}");
        EXIT_CONFIG
    })?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("\nstopping...");
        handler_token.cancel();
    }) {
        tracing::warn!(%err, "cannot install Ctrl-C handler");
    }

    Ok((config, store, cancel))
}
