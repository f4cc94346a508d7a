//! Logging and observability
//!
//! This module provides structured logging via tracing-subscriber, with text
//! and JSON formats selected at runtime (no feature flags), plus the
//! per-invocation [`HarnessLog`] that is attached to result listeners as a
//! log artifact.
//!
//! All logging output is directed to stderr to preserve stdout for command
//! output.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with optional format specification
///
/// Sets up tracing-subscriber with either JSON or text formatting based on
/// runtime configuration. Safe to call multiple times - subsequent calls are
/// no-ops.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for human-readable output, `"json"` for
///   structured JSON
///
/// ## Environment Variables
///
/// * `TETHER_LOG_FORMAT` - log output format ("json" for JSON, any other
///   value for text); overridden by the `format` argument
/// * `TETHER_LOG` - logging filter specification
/// * `RUST_LOG` - standard fallback when `TETHER_LOG` is unset
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("TETHER_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(fmt::layer().json().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter based on environment variables
fn create_env_filter() -> EnvFilter {
    if let Ok(directive) = std::env::var("TETHER_LOG") {
        EnvFilter::try_new(&directive).unwrap_or_else(|_| {
            tracing::warn!("invalid TETHER_LOG filter '{}', using 'info'", directive);
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
///
/// Primarily useful for testing scenarios.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

/// Per-invocation harness log.
///
/// One value is created at the start of each invocation and owned by it for
/// its whole duration; phase events are recorded into it, and its contents
/// are attached to the result listener as a named log artifact before the
/// terminal callback. Ownership replaces a process-wide log registry: the
/// owning scope guarantees the log is detached on every exit path, and
/// concurrent invocations cannot interleave their entries.
#[derive(Debug, Default)]
pub struct HarnessLog {
    lines: Vec<String>,
}

impl HarnessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one timestamped entry.
    pub fn record(&mut self, message: impl AsRef<str>) {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        self.lines.push(format!("{} {}", stamp, message.as_ref()));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The accumulated log text, one entry per line.
    pub fn contents(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Use a mutex to ensure tests don't interfere with each other
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_init_multiple_calls_safe() {
        let _guard = TEST_MUTEX.lock().unwrap();

        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("text")).is_ok());
    }

    #[test]
    fn test_is_initialized() {
        let _guard = TEST_MUTEX.lock().unwrap();

        let _ = init(None);
        assert!(is_initialized());
    }

    #[test]
    fn test_harness_log_records_in_order() {
        let mut log = HarnessLog::new();
        assert!(log.is_empty());
        assert_eq!(log.contents(), "");

        log.record("invocation started");
        log.record("target preparation complete");
        let contents = log.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("invocation started"));
        assert!(lines[1].ends_with("target preparation complete"));
        assert!(contents.ends_with('\n'));
    }
}
