use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// The server also wants the per-request spans from `TraceLayer`.
pub const SERVER_DIRECTIVE: &str = "info,tower_http=debug";

pub fn init() -> anyhow::Result<()> {
    init_with(DEFAULT_DIRECTIVE)
}

/// Install the stderr subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init_with(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .with_context(|| format!("build log filter from {default_directive:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
