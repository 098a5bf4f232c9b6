// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logging configuration for SCDB components
//!
//! Provides centralized logging setup with:
//! - Console output with structured formatting
//! - Optional file logging to the temporary directory
//! - Environment variable support (RUST_LOG)
//!
//! Hosts that embed the debugger call [`init_logging`] once at startup. Extra layers
//! (for example the engine's front-end log forwarder) can be stacked through
//! [`init_logging_with_layer`].

use eyre::{eyre, Result};
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize logging for an SCDB component
///
/// This function sets up:
/// - Structured console logging with timestamps
/// - File logging to a temporary directory with daily rotation
/// - Environment variable support for log levels (RUST_LOG)
/// - Default INFO level if no RUST_LOG is set
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "scdb-host")
/// * `enable_file_logging` - Whether to also write a rolling log file
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    init_logging_with_layer(component_name, enable_file_logging, None::<fmt::Layer<Registry>>)
}

/// Same as [`init_logging`], with one additional layer stacked on the registry.
///
/// The extra layer sees every event regardless of the console filter, which is what the
/// engine's front-end log forwarder needs.
pub fn init_logging_with_layer<L>(
    component_name: &str,
    enable_file_logging: bool,
    extra: Option<L>,
) -> Result<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_filter(default_filter(Level::INFO)?);

    let file_layer = if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;
        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        // The guard must live for the whole process or buffered lines are lost.
        std::mem::forget(guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .with_writer(non_blocking_appender)
                .with_filter(default_filter(Level::DEBUG)?),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(extra)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

    tracing::info!(
        component = component_name,
        file_logging = enable_file_logging,
        rust_log = %env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        "Logging initialized"
    );

    Ok(())
}

/// Create log directory in system temp folder
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("scdb-logs").join(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// `RUST_LOG` if set, otherwise everything at `level` and above.
fn default_filter(level: Level) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .map_err(|e| eyre!("Failed to create environment filter: {e}"))
}

/// Initialize simple logging (console only, compact formatting)
///
/// This is useful for tests or small hosts that don't need file output.
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(level)?)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre!("Failed to initialize simple logging: {e}"))?;

    Ok(())
}

// Global test logging initialization - ensures logging is only set up once across all tests
static TEST_LOGGING_INIT: Once = Once::new();

/// Safe logging initialization for tests - can be called multiple times without crashing
///
/// Console-only output at INFO by default (or `default_level`), respecting RUST_LOG.
/// Initialization happens once per test process; later calls are no-ops.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // A subscriber may already be installed by another harness; that is fine.
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, warn};

    #[test]
    fn test_logging_functions_work() {
        ensure_test_logging(None);

        info!("Test info message");
        warn!(depth = 3, "Test warning message");
        debug!("Test debug message");
    }

    #[test]
    fn test_log_directory_creation() {
        let log_dir = create_log_directory("test-component").unwrap();
        assert!(log_dir.exists());
        assert!(log_dir.to_string_lossy().contains("scdb-logs"));
        assert!(log_dir.to_string_lossy().contains("test-component"));
    }

    #[test]
    fn test_repeated_initialization_is_graceful() {
        ensure_test_logging(None);

        // A subscriber is already installed, so these must fail without panicking.
        assert!(init_logging("test-repeat-1", false).is_err());
        assert!(init_simple_logging(Level::DEBUG).is_err());

        info!("Logging still works after repeated init attempts");
    }
}
