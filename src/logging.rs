use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "translatable=debug,lopdf=warn";

/// Logs to stderr when `verbose` is set; `RUST_LOG` overrides the filter.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .try_init();
    Ok(())
}
