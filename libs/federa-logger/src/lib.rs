mod config;
pub use config::{Level, LogTargetConfig, LoggingConfig};

pub type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs a global subscriber. Fails if one is already installed, which
/// integration tests are expected to ignore.
pub fn init(config: &LoggingConfig) -> Result<(), AnyError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_filter(config.targets());

    tracing_subscriber::registry().with(fmt).try_init()?;
    Ok(())
}
