use crate::record::is_blank;
use crate::utils::truncate_str;
use crate::MediaRecord;
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Debug)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub console_output: bool,
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_level: "info".into(),
            console_output: true,
            file_output: true,
        }
    }
}

const CARD_WIDTH: usize = 80;
const LABEL_WIDTH: usize = 10;
const VALUE_WIDTH: usize = CARD_WIDTH - LABEL_WIDTH - 5;

fn card_row(label: &str, value: &str) -> String {
    let value = if is_blank(value) { "N/A" } else { value };
    format!(
        "║ {:<label_width$} {:<value_width$} ║",
        format!("{label}:"),
        truncate_str(value, VALUE_WIDTH),
        label_width = LABEL_WIDTH,
        value_width = VALUE_WIDTH
    )
}

/// One boxed summary of a record at `info` level.
pub fn log_media_card(record: &MediaRecord) {
    let fields = &record.fields;
    let kind = match record.subtype {
        Some(subtype) => format!("{} {} ({:?})", record.provider, record.media_type, subtype),
        None => format!("{} {}", record.provider, record.media_type),
    };
    let error = record
        .error
        .as_ref()
        .map(|e| format!("{}: {}", e.kind, e.message))
        .unwrap_or_default();

    let rows = [
        card_row("URL", &record.url),
        card_row("Canonical", &record.canonical_url),
        card_row("Kind", &kind),
        card_row("UUID", &record.identity.uuid),
        card_row("Title", &fields.title),
        card_row("Author", &fields.author_name),
        card_row("Picture", &fields.picture),
        card_row("Error", &error),
    ];
    let horizontal_line = "═".repeat(CARD_WIDTH - 2);

    info!(
        "\n╔{}╗\n{}\n╚{}╝",
        horizontal_line,
        rows.join("\n"),
        horizontal_line
    );
}

pub fn log_error_card<E: Display + std::error::Error>(url: &str, error: &E) {
    let mut details = error.to_string();
    if let Some(source) = error.source() {
        details = format!("{details} (caused by: {source})");
    }

    let horizontal_line = "═".repeat(CARD_WIDTH - 2);
    let separator = "─".repeat(CARD_WIDTH - 2);

    error!(
        "\n╔{}╗\n{}\n║{}║\n{}\n╚{}╝",
        horizontal_line,
        card_row("URL", url),
        separator,
        card_row("Error", &details),
        horizontal_line
    );
}

/// Installs the global subscriber: pretty console output and a daily
/// rolling file under `log_dir`. `RUST_LOG` overrides `log_level`.
pub fn setup_logging(config: LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = subscriber_fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(subscriber_fmt::format::FmtSpan::CLOSE)
            .pretty();
        layers.push(console_layer.boxed());
    }

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "media-parser.log");

        let file_layer = subscriber_fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_writer(file_appender);

        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .expect("Failed to set global default subscriber");

    debug!(config = ?config, "Logging initialized");
}

/// Scoped subscriber at `level`, restored on drop. Handy in tests.
pub struct LogLevelGuard {
    _guard: tracing::dispatcher::DefaultGuard,
}

impl LogLevelGuard {
    pub fn set_level(level: &str) -> Self {
        let subscriber = tracing_subscriber::registry()
            .with(subscriber_fmt::layer().with_test_writer())
            .with(EnvFilter::new(level));

        LogLevelGuard {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
