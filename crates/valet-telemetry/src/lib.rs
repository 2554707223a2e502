mod logging;

pub use logging::{LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Whether to persist warn+ logs to SQLite for later inspection.
    pub log_to_sqlite: bool,
    /// Path to the log database.
    pub log_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            log_to_sqlite: true,
            log_db_path: valet_dir().join("logs.db"),
        }
    }
}

/// Keeps the log sink alive and queryable for the process lifetime.
pub struct TelemetryGuard {
    log_sink: Option<Arc<SqliteLogSink>>,
}

impl TelemetryGuard {
    /// Access the log sink for querying persisted logs.
    pub fn logs(&self) -> Option<&SqliteLogSink> {
        self.log_sink.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.to_string().to_lowercase())
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter);

    let (sqlite_layer, sqlite_sink) = if config.log_to_sqlite {
        match SqliteLogSink::new(&config.log_db_path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                let layer = SqliteLogLayer::new(sink.clone());
                (Some(layer), Some(sink))
            }
            Err(e) => {
                eprintln!("valet-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sqlite_layer)
        .init();

    TelemetryGuard {
        log_sink: sqlite_sink,
    }
}

/// Default data directory for valet databases.
pub fn valet_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".valet")
}
