use tracing_subscriber::EnvFilter;

use crate::error::VaultError;

pub const DEFAULT_FILTER: &str = "primevault_core=info,primevault_adapters=info,warn";

/// Installs the global fmt subscriber, filtered by `RUST_LOG` or [`DEFAULT_FILTER`].
pub fn init_tracing() -> Result<(), VaultError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| VaultError::Config(format!("tracing subscriber: {}", err)))
}
