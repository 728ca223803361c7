//! # Logging
//!
//! `tracing` setup for the node. Everything is written to stderr: stdout
//! carries command output (public keys, submission payloads) and has to stay
//! clean when piped.
//!
//! `RUST_LOG` wins when set. Otherwise the configured `log_level` is applied
//! to the warden crates and the HTTP trace layer, and every other crate
//! (sled in particular) is held at `warn`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates that follow the configured level.
const OWN_TARGETS: &[&str] = &["warden_node", "warden_protocol", "tower_http"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, one event per line, for a terminal.
    Pretty,
    /// JSON lines for a log collector.
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON; anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Expand a bare level such as `"debug"` into per-crate directives. A value
/// that already contains directives (`=` or `,`) is used verbatim.
fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directives = String::from("warn");
    for target in OWN_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init(),
    }

    tracing::debug!(?format, "logging initialized");
}
