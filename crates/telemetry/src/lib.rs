//! Logging and tracing bootstrap.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use scheduledb_kernel::settings::{LogFormat, TelemetrySettings};

/// Build the env filter: `RUST_LOG` wins over `telemetry.filter`.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|err| anyhow!("invalid telemetry.filter '{}': {}", settings.filter, err)),
    }
}

/// Install the global tracing subscriber. Output goes to stderr so stdout stays
/// free for reports.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = env_filter(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match settings.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {}", err))?;

    tracing::debug!(
        target: "scheduledb-telemetry",
        format = ?settings.log_format,
        "telemetry initialized"
    );
    Ok(())
}
