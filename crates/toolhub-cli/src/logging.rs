// Tracing subscriber setup for the toolhub binary

use toolhub_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set, else from the configured level
///
/// `verbose` raises the toolhub crates to `debug` on top of either.
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> anyhow::Result<EnvFilter> {
    let mut filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(&config.level)?,
    };

    if verbose {
        for target in ["toolhub", "toolhub_cache", "toolhub_gitlab", "toolhub_tools", "toolhub_cli"] {
            filter = filter.add_directive(format!("{}=debug", target).parse()?);
        }
    }
    Ok(filter)
}

/// Install the global subscriber; logs go to stderr so stdout stays parseable
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = build_filter(config, verbose)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
    }
}
