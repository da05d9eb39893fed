use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{SynthError, SynthResult};
use crate::output::run_stamp;

/// Handle that keeps the file writer alive; drop it only at process exit
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    pub log_file: Option<PathBuf>,
}

/// Initialize the logging system for formsynth
pub fn init_logging(config: &LoggingConfig) -> SynthResult<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "formsynth={},reqwest=warn,hyper=warn,{}",
            config.level, config.level
        ))
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .boxed();

    let registry = Registry::default().with(env_filter).with(console_layer);

    if !config.enable_file_logging {
        registry.init();
        return Ok(LoggingGuard {
            _file_guard: None,
            log_file: None,
        });
    }

    let run_dir = config.log_dir.join(&config.prefix);
    fs::create_dir_all(&run_dir)
        .map_err(|e| SynthError::file_io(run_dir.to_string_lossy().to_string(), e))?;

    // One file per run, named like <prefix>_<uuid>_<timestamp>.log
    let file_name = format!("{}_{}_{}.log", config.prefix, uuid::Uuid::new_v4(), run_stamp());
    let file_appender = rolling::never(&run_dir, &file_name);
    let (file_writer, guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .boxed();

    registry.with(file_layer).init();

    let log_file = run_dir.join(file_name);
    info!("🪵 Log file: {}", log_file.display());
    info!("Log level: {}", config.level);

    Ok(LoggingGuard {
        _file_guard: Some(guard),
        log_file: Some(log_file),
    })
}

/// Performance logging utilities
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!("⏱️  Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        info!("⏱️  Completed {}: {}ms", self.operation, self.elapsed_ms());
    }
}

/// Macro for logging a recoverable item failure with context
#[macro_export]
macro_rules! log_item_failure {
    ($error:expr, $item:expr) => {
        tracing::error!(
            error = %$error,
            item = %$item,
            recoverable = $error.is_recoverable(),
            "❌ Item failed"
        );
    };
}
