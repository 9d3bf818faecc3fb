//! Process logging setup.
//!
//! Components only emit `tracing` events. Binaries and tests call
//! [`init_logging`] once to install a subscriber: compact lines on stderr by
//! default, JSON lines when `RESILIENT_LOG_FORMAT=json`. `RUST_LOG` takes
//! precedence over the level passed in.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "RESILIENT_LOG_FORMAT";

/// Parses a level name; anything unrecognized is INFO.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber.
///
/// Returns false when a subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn init_logging(service: &str, level: &str) -> bool {
    let default_level = parse_level(level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_lowercase()));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    match result {
        Ok(()) => {
            tracing::info!(service = %service, level = %default_level, "Logging initialized");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_levels() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level(" warning "), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn unknown_level_is_info() {
        assert_eq!(parse_level("loud"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn second_init_is_refused() {
        init_logging("test", "debug");
        assert!(!init_logging("test", "debug"));
    }
}
