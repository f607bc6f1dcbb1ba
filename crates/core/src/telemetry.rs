//! Tracing subscriber setup for the binary.

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level` when set.
#[cfg(feature = "trace")]
pub fn init_tracing(default_level: &str, json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}

#[cfg(not(feature = "trace"))]
pub fn init_tracing(_default_level: &str, _json: bool) -> anyhow::Result<()> {
    Ok(())
}
