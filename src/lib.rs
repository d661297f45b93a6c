pub mod config;
pub mod dictionary;
pub mod server;
pub mod worker;

use std::sync::Arc;

use self::config::Config;

/// Build and start the demo server. The returned handle stays alive for the
/// lifetime of the process; `main` parks on it.
pub fn startup(config: &Config) -> anyhow::Result<Arc<roda_core::RemoteAccessServer>> {
    server::start(config)
}
