//! Tracing setup: a size-capped log file plus optional stderr mirroring.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Cap on the log file; small hosts usually log to an SD card.
pub const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_FILTER: &str = "debug";

/// Where and how to log.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub file: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

struct LogWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    bytes_written: u64,
}

impl LogWriter {
    fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        let mut bytes_written = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if bytes_written > max_bytes {
            let _ = fs::remove_file(path);
            bytes_written = 0;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            max_bytes,
            bytes_written,
        })
    }

    fn rotate_if_needed(&mut self, next_len: usize) {
        if self.bytes_written.saturating_add(next_len as u64) <= self.max_bytes {
            return;
        }
        if let Ok(file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = file;
            self.bytes_written = 0;
        }
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<()> {
        self.rotate_if_needed(buf.len());
        self.file.write_all(buf)?;
        self.bytes_written = self.bytes_written.saturating_add(buf.len() as u64);
        Ok(())
    }
}

/// Cloneable handle the fmt layer writes through.
#[derive(Clone)]
pub struct SharedLogFile {
    inner: Arc<Mutex<LogWriter>>,
}

impl SharedLogFile {
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(LogWriter::open(path, max_bytes)?)),
        })
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.file.flush()
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default debug level.
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match &settings.file {
        Some(path) => {
            let writer = SharedLogFile::open(path, LOG_MAX_BYTES)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            let make_writer = move || writer.clone();
            let layer = if settings.json {
                fmt::layer()
                    .json()
                    .with_span_list(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(make_writer)
                    .boxed()
            } else {
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(make_writer)
                    .boxed()
            };
            Some(layer)
        }
        None => None,
    };

    let stderr_layer = settings.verbose.then(|| {
        fmt::layer()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))?;

    install_panic_hook();
    Ok(())
}

/// Record panics in the log before the default hook prints them.
fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(text) = info.payload().downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = info.payload().downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!(
            location = %location,
            version = env!("CARGO_PKG_VERSION"),
            "panic: {payload}"
        );
        previous(info);
    }));
}
