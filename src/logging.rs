use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_core::{Event, Field, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{DeployError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_LOG_FILTER: &str = "info";

/// One line of the deploy log
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: String) -> Self {
        Self {
            timestamp: Local::now(),
            message,
        }
    }

    /// `[YYYY-MM-DD HH:MM:SS] message` plus a trailing newline
    pub fn render(&self) -> String {
        format!(
            "[{}] {}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

/// Collects an event's message, followed by any extra `key=value` fields.
#[derive(Default)]
struct LogEntryVisitor {
    message: String,
    fields: String,
}

impl LogEntryVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl tracing::field::Visit for LogEntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Tracing layer that writes every event as a single timestamped line.
///
/// Each line goes out in one `write_all`, so sinks shared between
/// concurrent requests never see interleaved entries.
pub struct LogSinkLayer<W> {
    make_writer: W,
}

impl<W> LogSinkLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<S, W> Layer<S> for LogSinkLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LogEntryVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry::now(visitor.into_message());
        let mut writer = self.make_writer.make_writer_for(event.metadata());
        // Nowhere left to report a failed log write.
        let _ = writer.write_all(entry.render().as_bytes());
    }
}

/// Installs the global subscriber: log file plus stdout, filtered by
/// `RUST_LOG` (default `info`).
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn setup_logging(log_file: &Path) -> Result<WorkerGuard> {
    let file_name = log_file.file_name().ok_or_else(|| {
        DeployError::ConfigError(format!("Invalid log file path '{}'", log_file.display()))
    })?;
    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // The appender panics on an unwritable path, so surface that here first.
    std::fs::create_dir_all(directory)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| {
            DeployError::ConfigError(format!(
                "Cannot open log file '{}': {}",
                log_file.display(),
                e
            ))
        })?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (file_writer, guard) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(LogSinkLayer::new(file_writer))
        .with(LogSinkLayer::new(std::io::stdout)) // Console output
        .try_init()
        .map_err(|e| DeployError::ConfigError(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
