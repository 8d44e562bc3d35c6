use crate::config::LoggingConfig;
use std::{
    io::{IsTerminal, Write},
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};

// -------- level helpers --------
fn parse_tracing_level(s: &str) -> Option<tracing::Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

// -------- rotating writer for files --------
#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendCount>>>);

impl<'a> fmt::MakeWriter<'a> for RotWriter {
    type Writer = RotWriterHandle;
    fn make_writer(&'a self) -> Self::Writer {
        RotWriterHandle(self.0.clone())
    }
}

#[derive(Clone)]
struct RotWriterHandle(Arc<Mutex<FileRotate<AppendCount>>>);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?
            .flush()
    }
}

/// Create a rotating writer for log files, ensuring the parent directory exists.
fn create_rotating_writer_at_path(
    log_path: &Path,
    max_bytes: usize,
    max_files: usize,
) -> std::io::Result<RotWriter> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let rot = FileRotate::new(
        log_path,
        AppendCount::new(max_files),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None, // file permissions (Unix only)
    );

    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

fn create_file_writer(cfg: &LoggingConfig) -> Option<RotWriter> {
    if cfg.file.trim().is_empty() || parse_tracing_level(&cfg.file_level).is_none() {
        return None;
    }

    let max_bytes = cfg.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let max_files = cfg.max_backups.unwrap_or(3);
    let log_path = Path::new(&cfg.file);

    match create_rotating_writer_at_path(log_path, max_bytes as usize, max_files) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!(
                "Failed to initialize log file '{}': {}",
                log_path.to_string_lossy(),
                e
            );
            None
        }
    }
}

// -------- public init --------

/// Initialize logging from a configuration.
///
/// Console output is human-readable; the optional file sink receives JSON lines.
/// `RUST_LOG`, when set, replaces the configured console level.
pub fn init_logging_from_config(cfg: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // Bridge `log` → `tracing` *before* installing the subscriber
    let _ = tracing_log::LogTracer::init();

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(level_filter(&cfg.console_level).into())
    });

    let console_layer = fmt::layer()
        .with_ansi(std::io::stdout().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_filter);

    let file_layer = create_file_writer(cfg).map(|writer| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(writer)
            .with_filter(level_filter(&cfg.file_level))
    });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// =================== tests ===================
