// Logger setup for the demo binary and tests.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Install `env_logger` as the global logger.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `debug` with `verbose`
/// and `info` without.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.to_string()));
    builder.format_timestamp_millis();

    // Already initialised (tests, embedding hosts): keep the existing logger.
    let _ = builder.try_init();
}
