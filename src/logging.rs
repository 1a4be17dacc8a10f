//! Diagnostic logging initialization.
//!
//! Packet lines and command replies go to stdout; diagnostics go to stderr
//! through `tracing-subscriber` so the two never interleave on one stream.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Formats
///
/// * `"pretty"` - Human-readable output (default)
/// * `"json"` - Machine-parseable JSON lines
pub fn init_tracing(level: &str, format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))?,
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e))?,
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'pretty' or 'json'",
                format
            ));
        }
    }

    Ok(())
}
