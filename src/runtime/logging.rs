use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::runtime::config::Config;

/// Install a `fmt` subscriber filtered by `SDRFLOW_LOG`, falling back to the configured level.
pub fn init(config: &Config) {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .with_env_var("SDRFLOW_LOG")
        .from_env_lossy();

    let format = fmt::layer().compact().with_thread_names(true);

    if tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .is_err()
    {
        debug!("logger already initialized");
    }
}
