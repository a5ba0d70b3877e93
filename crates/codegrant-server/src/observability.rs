//! Subscriber setup for the demo server.
//!
//! `RUST_LOG` wins over `[logging].level`, so a deployment can turn on
//! `codegrant_auth=debug` without touching the config file.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Builds the event filter for the configured logging section.
pub fn log_filter(logging: &LoggingConfig) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&logging.level)
        .map_err(|e| format!("logging.level {:?} is not a valid filter: {e}", logging.level))
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    let filter = log_filter(logging)?;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
        }
    }

    #[test]
    fn test_log_filter_accepts_directives() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = log_filter(&logging("warn,codegrant_auth=debug")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_log_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = log_filter(&logging("codegrant_auth=loud")).unwrap_err();
        assert!(err.contains("logging.level"), "{err}");
    }
}
