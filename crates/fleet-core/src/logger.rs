// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging bootstrap and the log line formatter.
//!
//! # Format
//!
//! ```text
//! <timestamp> <L>! [span{span_fields}] message {event_fields}
//! ```
//!
//! where `<L>` is the first letter of the level. Agent tasks run inside an
//! `agent` span carrying their config path, so every line an agent emits
//! names the file it came from:
//!
//! ```text
//! 2024-05-01T10:00:00Z I! starting 2 agents
//! 2024-05-01T10:00:00Z E! [agent{config=conf.d/mem.conf}] error when running config conf.d/mem.conf: no inputs found
//! 2024-05-01T10:00:07Z I! stopping
//! ```
//!
//! # Destinations
//!
//! Lines go to standard error or to a file. File output is written through a
//! non-blocking worker; the returned [`LoggerGuard`] must be kept alive until
//! the process exits or buffered lines are lost.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    time::{ChronoLocal, ChronoUtc, FormatTime},
    writer::BoxMakeWriter,
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::config::log_level::{LogDestination, LogSettings, LogTimezone};
use crate::error::LoggerError;

const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);
const DAY: Duration = Duration::from_secs(86_400);

/// Timestamp source for log lines.
#[derive(Debug, Clone)]
pub enum LogTimer {
    Utc(ChronoUtc),
    Local(ChronoLocal),
}

impl LogTimer {
    #[must_use]
    pub fn new(timezone: &LogTimezone) -> Self {
        match timezone {
            LogTimezone::Local => LogTimer::Local(ChronoLocal::new(LOCAL_FORMAT.to_string())),
            LogTimezone::Utc | LogTimezone::Unsupported(_) => {
                LogTimer::Utc(ChronoUtc::new(UTC_FORMAT.to_string()))
            }
        }
    }
}

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut format::Writer<'_>) -> fmt::Result {
        match self {
            LogTimer::Utc(timer) => timer.format_time(w),
            LogTimer::Local(timer) => timer.format_time(w),
        }
    }
}

/// Event formatter producing `<timestamp> <L>! [span] message` lines.
#[derive(Debug, Clone)]
pub struct Formatter {
    timer: Option<LogTimer>,
}

impl Formatter {
    #[must_use]
    pub fn new(timer: LogTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Formatter that omits the timestamp.
    #[must_use]
    pub fn without_time() -> Self {
        Self { timer: None }
    }
}

fn level_letter(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'T',
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(timer) = &self.timer {
            timer.format_time(&mut writer)?;
            write!(writer, " ")?;
        }
        write!(writer, "{}! ", level_letter(event.metadata().level()))?;

        // spans from root to current, each as [name{fields}]
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "[{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, "] ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggerGuard {
    _worker: Option<WorkerGuard>,
}

/// Loads the configuration at `path` and installs the logger it describes.
/// The loaded configuration is handed back for the remaining settings.
pub fn setup_logger(path: &Path) -> Result<(Config, LoggerGuard), LoggerError> {
    let config = Config::from_file(path)?;
    let guard = init(&config.log_settings())?;
    Ok((config, guard))
}

/// Installs the process-wide subscriber described by `settings`.
///
/// Fails if the log file cannot be opened or a global subscriber is already
/// installed.
pub fn init(settings: &LogSettings) -> Result<LoggerGuard, LoggerError> {
    let filter =
        EnvFilter::try_new(settings.level.as_ref()).map_err(|e| LoggerError::Filter(e.to_string()))?;
    let (writer, worker) = make_writer(settings)?;

    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .event_format(Formatter::new(LogTimer::new(&settings.timezone)))
        .finish()
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;
    log::set_max_level(settings.level.as_level_filter());

    crate::log_build_info();
    report_unsupported(settings);
    debug!("Logging subsystem enabled");

    Ok(LoggerGuard { _worker: worker })
}

fn report_unsupported(settings: &LogSettings) {
    if let LogTimezone::Unsupported(name) = &settings.timezone {
        warn!("log timezone '{name}' is not supported, using UTC");
    }
    if settings.rotation_max_size > 0 {
        warn!(
            "size based log rotation is not supported, ignoring logfile_rotation_max_size = {}",
            settings.rotation_max_size
        );
    }
    let interval = settings.rotation_interval;
    if !interval.is_zero() && ![MINUTE, HOUR, DAY].contains(&interval) {
        debug!(
            "log rotation interval {:?} rounded to {:?}",
            interval,
            rotation_for(interval)
        );
    }
}

fn make_writer(settings: &LogSettings) -> Result<(BoxMakeWriter, Option<WorkerGuard>), LoggerError> {
    match &settings.destination {
        LogDestination::Stderr => Ok((BoxMakeWriter::new(io::stderr), None)),
        LogDestination::File(path) => {
            let appender = rolling_appender(path, settings)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Ok((BoxMakeWriter::new(writer), Some(guard)))
        }
    }
}

fn rolling_appender(path: &Path, settings: &LogSettings) -> Result<RollingFileAppender, LoggerError> {
    let log_file_error = |source: io::Error| LoggerError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            log_file_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "log file path has no file name",
            ))
        })?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory).map_err(log_file_error)?;

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation_for(settings.rotation_interval))
        .filename_prefix(file_name);
    if let Some(max_files) = max_log_files(settings.rotation_max_archives) {
        builder = builder.max_log_files(max_files);
    }
    builder
        .build(directory)
        .map_err(|e| log_file_error(io::Error::new(io::ErrorKind::Other, e.to_string())))
}

/// Maps a rotation interval onto the closest supported period.
fn rotation_for(interval: Duration) -> Rotation {
    if interval.is_zero() {
        Rotation::NEVER
    } else if interval < HOUR {
        Rotation::MINUTELY
    } else if interval < DAY {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    }
}

/// Files to keep, counting the active one. Negative archive counts keep all.
fn max_log_files(archives: i64) -> Option<usize> {
    usize::try_from(archives).ok().map(|n| n + 1)
}
