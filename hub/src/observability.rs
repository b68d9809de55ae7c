//! Tracing/log initialization (spec §6 "Logging").
//!
//! Emits structured logs either as pretty-printed lines (local development,
//! `LogFormat::Pretty`) or single-line JSON (production, `LogFormat::Json`).
//! When the `journald` feature is enabled, logs additionally go to the
//! systemd journal via `tracing-journald`, which is how this service is
//! expected to run when deployed as a unit.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitError, EnvFilter, Registry};

use crate::config::{Config, LogFormat};
use crate::error::{Error, Result};

/// Initializes the global tracing subscriber from the resolved config.
pub fn init_tracing(config: &Config) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    #[cfg(feature = "journald")]
    {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                subscriber
                    .with(journald_layer)
                    .try_init()
                    .map_err(into_config_error)?;
            }
            Err(err) => {
                subscriber.try_init().map_err(into_config_error)?;
                tracing::warn!("journald unavailable, logging to stdout only: {err}");
            }
        }
    }

    #[cfg(not(feature = "journald"))]
    {
        subscriber.try_init().map_err(into_config_error)?;
    }

    tracing::info!(
        service = %config.service_name,
        format = ?config.log_format,
        "tracing initialized"
    );

    Ok(())
}

fn into_config_error(err: SubscriberInitError) -> Error {
    Error::Config(format!("failed to install tracing subscriber: {err}"))
}

/// Flushes any buffered log output. Currently a no-op: the fmt subscriber
/// writes synchronously, but this gives `main` a single place to extend
/// if a buffered sink is ever added.
pub fn shutdown_tracing() {
    tracing::info!("tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_config_does_not_panic_building_layers() {
        let config = Config {
            log_format: LogFormat::Pretty,
            ..Config::default()
        };
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn json_config_does_not_panic_building_layers() {
        let config = Config {
            log_format: LogFormat::Json,
            ..Config::default()
        };
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
