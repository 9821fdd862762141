pub mod api;
pub mod config;
pub mod machine;
pub mod observation;
pub mod repeat;
pub mod sound;
pub mod store;
pub mod time;

use crate::config::LogConfig;
use crate::error::InitializationError;
use crate::time::DISPLAY_FORMAT;
use chrono::Utc;
use chrono_tz::Tz;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, registry};

pub use config::{Config, load_config};

pub mod error {
    use std::path::PathBuf;
    use thiserror::Error;
    use tracing_subscriber::filter::ParseError;
    use tracing_subscriber::util::TryInitError;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("failed to load configuration: {0}")]
        Figment(#[from] figment::Error),
        #[error("invalid configuration value for `{field}`: {reason}")]
        Invalid { field: &'static str, reason: String },
    }

    #[derive(Debug, Error)]
    pub enum InitializationError {
        #[error(transparent)]
        Tracing(#[from] TryInitError),
        #[error("invalid log filter: {0}")]
        LogFilter(#[from] ParseError),
        #[error("failed to open log file {}: {source}", path.display())]
        LogFile {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error(transparent)]
        Config(#[from] ConfigError),
    }
}

/// Renders log timestamps as wall-clock time in the configured zone.
struct ZonedTimer(Tz);

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            Utc::now().with_timezone(&self.0).format(DISPLAY_FORMAT)
        )
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Console output is used when no sink is enabled at all, so a misconfigured
/// `log` table never silences the process.
pub fn init_tracing(log: &LogConfig, tz: Tz) -> Result<(), InitializationError> {
    let env_filter_layer = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.level)?,
    };

    let console_layer = (log.to_console || !log.to_file).then(|| {
        fmt::layer()
            .compact()
            .with_file(true)
            .with_line_number(true)
            .with_timer(ZonedTimer(tz))
    });

    let file_layer = if log.to_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log.file_path)
            .map_err(|source| InitializationError::LogFile {
                path: log.file_path.clone(),
                source,
            })?;
        Some(
            fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(ZonedTimer(tz))
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    registry()
        .with(env_filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

pub async fn shutdown_listener(token: Option<CancellationToken>) {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(name: "signal.ctrlc.received", "received Ctrl+C signal, shutting down"),
        _ = terminate => info!(name: "signal.sigterm.received", "received SIGTERM signal, shutting down"),
    }

    if let Some(token) = token {
        token.cancel();
    }
}
