//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; binaries decide whether and how
//! to print them. `RUST_LOG` is honoured on top of the configured level.
//!
//! ```no_run
//! callscope::logging::init_from_env();
//! tracing::info!(call_id = "c1", "Processing call");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Subscriber options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum level for `callscope` events
    pub level: Level,
    /// One JSON object per line instead of human-readable output
    pub use_json: bool,
    pub include_target: bool,
    /// File and line of the emitting call site
    pub include_location: bool,
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with full metadata, for log shipping
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self::with_level(Level::DEBUG)
    }

    /// Read `CALLSCOPE_LOG_LEVEL` and `CALLSCOPE_LOG_JSON`
    pub fn from_env() -> Self {
        let level = env::var("CALLSCOPE_LOG_LEVEL")
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(Level::INFO);
        let use_json = env::var("CALLSCOPE_LOG_JSON")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);

        Self {
            level,
            use_json,
            ..Default::default()
        }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("callscope={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        // A subscriber installed elsewhere wins
        let _ = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        };
    });
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" WARN "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_presets() {
        assert!(LoggingConfig::production().use_json);
        assert_eq!(LoggingConfig::development().level, Level::DEBUG);
        assert!(!LoggingConfig::default().use_json);
    }

    #[test]
    fn test_with_level_keeps_default_layout() {
        let config = LoggingConfig::with_level(Level::WARN);
        assert_eq!(config.level, Level::WARN);
        assert_eq!(
            LoggingConfig {
                level: Level::INFO,
                ..config
            },
            LoggingConfig::default()
        );
    }

    #[test]
    fn test_level_directive_parses() {
        // The global subscriber is left alone so test output stays clean
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            let directive = format!("callscope={}", level);
            assert!(
                directive.parse::<tracing_subscriber::filter::Directive>().is_ok(),
                "{} should parse",
                directive
            );
        }
    }
}
