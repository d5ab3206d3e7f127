//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over the
//! `--log-level` flag when set.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: &str, format: LogFormat) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = parse_level(level);

        let mut filter = EnvFilter::from_default_env();
        if std::env::var("RUST_LOG").is_err() {
            for directive in [
                format!("upload_scout={}", level),
                format!("upload_scout_core={}", level),
                format!("uscout={}", level),
                "russh=warn".to_string(),
                "sqlx=warn".to_string(),
                "hyper=warn".to_string(),
                "reqwest=warn".to_string(),
            ] {
                if let Ok(directive) = directive.parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        let registry = tracing_subscriber::registry().with(filter);
        match format {
            LogFormat::Pretty => registry
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init(),
        }
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
