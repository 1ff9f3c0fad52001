//! Optional append-only log file next to the stderr output
//!
//! The file layer is always installed; writes are dropped unless file logging is
//! switched on, so it can be toggled without rebuilding the subscriber.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

const APP_DIR_NAME: &str = "ClaudeUsage";
const LOG_FILENAME: &str = "claude-usage.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_FILE: Lazy<Option<Arc<Mutex<std::fs::File>>>> = Lazy::new(|| {
    let file = open_log_file().or_else(|_| open_fallback_log_file());
    match file {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(err) => {
            eprintln!("claude-usage: file logging unavailable: {err}");
            None
        }
    }
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(LOG_FILENAME))
}

pub fn file_writer() -> LogFileWriter {
    LogFileWriter
}

fn open_log_file() -> io::Result<std::fs::File> {
    let path = log_file_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let path = std::env::temp_dir().join(LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogFileWriter;

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriterGuard
    }
}

pub struct LogFileWriterGuard;

impl LogFileWriterGuard {
    fn with_file<T>(
        &self,
        fallback: T,
        f: impl FnOnce(&mut std::fs::File) -> io::Result<T>,
    ) -> io::Result<T> {
        if !file_logging_enabled() {
            return Ok(fallback);
        }
        // Lazily opened so the file is only created once logging is turned on.
        match LOG_FILE.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => f(&mut file),
            _ => Ok(fallback),
        }
    }
}

impl Write for LogFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(buf.len(), |file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file((), |file| file.flush())
    }
}
