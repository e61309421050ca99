//! Tracing setup for the refresher binary.
//!
//! Cycle failures surface only through these logs, so the default level keeps
//! `error!` and `info!` cycle summaries visible.

use anyhow::{Context, Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (`off`, `error`, `warn`,
/// `info`, `debug`, `trace`) is used. An unknown level is an error.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// authmap-refresher --log-level debug --once
/// ```
pub fn init(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default().add_directive(level.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .context("install tracing subscriber")
}

/// Parse a `--log-level` value into a global level filter.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| anyhow!("invalid log level {level:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_parse() {
        assert_eq!(parse_level("info").expect("info"), LevelFilter::INFO);
        assert_eq!(parse_level("DEBUG").expect("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_level("off").expect("off"), LevelFilter::OFF);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = parse_level("bogus").unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
        assert!(init("bogus").is_err());
    }
}
