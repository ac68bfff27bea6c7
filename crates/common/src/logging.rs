//! Logging utilities for the MCP gateway crates.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Subscriber stack that extra layers are attached to.
pub type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Build the filter used by every subscriber.
///
/// `RUST_LOG` wins over the configured default level.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber: filter, an extra layer (e.g. OpenTelemetry
/// export, or `None`), then a text or JSON fmt layer.
pub fn try_init<L>(format: LogFormat, default_level: &str, extra: L) -> Result<(), TryInitError>
where
    L: Layer<FilteredRegistry> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(extra);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    }
}
