//! Logging setup for fraglet
//!
//! Console output with a configurable color theme, plus an optional daily
//! rolling log file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log file when file logging is on and no path is configured
const DEFAULT_LOG_FILE: &str = "logs/fraglet.log";

/// ANSI color codes for log levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTheme {
    pub trace: String,
    pub debug: String,
    pub info: String,
    pub warn: String,
    pub error: String,
}

impl Default for LogTheme {
    fn default() -> Self {
        Self {
            trace: "\x1b[37m".to_string(), // White
            debug: "\x1b[36m".to_string(), // Cyan
            info: "\x1b[32m".to_string(),  // Green
            warn: "\x1b[33m".to_string(),  // Yellow
            error: "\x1b[31m".to_string(), // Red
        }
    }
}

impl LogTheme {
    fn color(&self, level: &Level) -> &str {
        match *level {
            Level::TRACE => &self.trace,
            Level::DEBUG => &self.debug,
            Level::INFO => &self.info,
            Level::WARN => &self.warn,
            Level::ERROR => &self.error,
        }
    }
}

/// Initialize logging with the given configuration
pub async fn init_logging(
    log_level: &str,
    theme_path: &str,
    log_to_file: bool,
    log_file_path: Option<&str>,
) -> anyhow::Result<()> {
    let theme = load_theme(theme_path).await?;
    let level = parse_log_level(log_level)?;

    // RUST_LOG directives win over the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(LogFormatter {
            theme: theme.clone(),
            ansi: true,
        });

    let file_layer = if log_to_file {
        let (directory, file_name) = split_log_path(log_file_path.unwrap_or(DEFAULT_LOG_FILE));
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, file_name);
        Some(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .event_format(LogFormatter { theme, ansi: false }),
        )
    } else {
        None
    };

    let registry = tracing_subscriber::registry().with(filter);

    if let Some(file_layer) = file_layer {
        registry.with(console_layer).with(file_layer).try_init()?;
    } else {
        registry.with(console_layer).try_init()?;
    }

    Ok(())
}

/// Custom log formatter with theme colors
struct LogFormatter {
    theme: LogTheme,
    ansi: bool,
}

impl<S, N> fmt::FormatEvent<S, N> for LogFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let now = std::time::SystemTime::now();
        let datetime: chrono::DateTime<chrono::Utc> = now.into();
        write!(writer, "[{}] ", datetime.format("%Y-%m-%d %H:%M:%S%.3f UTC"))?;

        if self.ansi {
            let color = self.theme.color(metadata.level());
            write!(writer, "{}{:<5}\x1b[0m ", color, metadata.level())?;
        } else {
            write!(writer, "{:<5} ", metadata.level())?;
        }

        write!(writer, "{}: ", metadata.target())?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Load log theme from YAML file
async fn load_theme<P: AsRef<Path>>(path: P) -> anyhow::Result<LogTheme> {
    match fs::read_to_string(&path).await {
        Ok(contents) => {
            let theme: LogTheme = serde_yaml::from_str(&contents)?;
            Ok(theme)
        }
        Err(err) => {
            tracing::debug!(%err, "Failed to read theme file, using default theme");
            Ok(LogTheme::default())
        }
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level)),
    }
}

/// Split a log file path into the appender's directory and file name
fn split_log_path(path: &str) -> (&Path, &str) {
    let path = Path::new(path);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("fraglet.log");
    (directory, file_name)
}
