// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging settings extracted from the `[agent]` table of the top-level config.
//!
//! # Levels
//!
//! Agent configs do not name a level directly. Instead two flags pick one:
//! - `debug = true`: **DEBUG** (wins when `quiet` is also set)
//! - `quiet = true`: **ERROR**
//! - neither: **INFO**
//!
//! # Targets
//!
//! `logtarget` selects where lines go:
//! - `"stderr"`: always standard error, even if `logfile` is set
//! - `"file"`: the path in `logfile`, which must be present
//! - `""` (default): `logfile` when set, standard error otherwise
//! - `"eventlog"`: recognised but rejected, it only exists on Windows

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer};

/// Verbosity of the process-wide subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Directive form, usable as an `EnvFilter` directive.
impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl LogLevel {
    /// Picks the level from the `debug` and `quiet` agent flags.
    ///
    /// # Examples
    ///
    /// ```
    /// use fleet_core::config::log_level::LogLevel;
    ///
    /// assert_eq!(LogLevel::from_flags(false, false), LogLevel::Info);
    /// assert_eq!(LogLevel::from_flags(false, true), LogLevel::Error);
    ///
    /// // debug wins over quiet
    /// assert_eq!(LogLevel::from_flags(true, true), LogLevel::Debug);
    /// ```
    #[must_use]
    pub fn from_flags(debug: bool, quiet: bool) -> Self {
        if debug {
            LogLevel::Debug
        } else if quiet {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }

    /// Converts to the `log` crate's filter, for records bridged into tracing.
    ///
    /// # Examples
    ///
    /// ```
    /// use fleet_core::config::log_level::LogLevel;
    ///
    /// assert_eq!(LogLevel::Debug.as_level_filter(), log::LevelFilter::Debug);
    /// ```
    #[must_use]
    pub fn as_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Value of the `logtarget` setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Auto,
    Stderr,
    File,
    EventLog,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(LogTarget::Auto),
            "stderr" => Ok(LogTarget::Stderr),
            "file" => Ok(LogTarget::File),
            "eventlog" => Ok(LogTarget::EventLog),
            _ => Err(format!(
                "Invalid log target: '{s}'. Valid targets are: stderr, file, eventlog",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LogTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LogTarget::from_str(&s).map_err(de::Error::custom)
    }
}

/// Timestamp zone for log lines, from `log_with_timezone`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LogTimezone {
    #[default]
    Utc,
    Local,
    /// Named zones other than UTC and Local are not supported; lines fall back
    /// to UTC and the name is reported once logging is up.
    Unsupported(String),
}

impl From<&str> for LogTimezone {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("utc") {
            LogTimezone::Utc
        } else if trimmed.eq_ignore_ascii_case("local") {
            LogTimezone::Local
        } else {
            LogTimezone::Unsupported(trimmed.to_string())
        }
    }
}

/// Where log lines end up once the target has been resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    File(PathBuf),
}

/// Everything the logging bootstrap needs, detached from the config document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub destination: LogDestination,
    /// Zero disables time-based rotation.
    pub rotation_interval: Duration,
    /// Zero disables size-based rotation.
    pub rotation_max_size: u64,
    /// Rotated files to keep besides the active one; negative keeps all.
    pub rotation_max_archives: i64,
    pub timezone: LogTimezone,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            destination: LogDestination::Stderr,
            rotation_interval: Duration::ZERO,
            rotation_max_size: 0,
            rotation_max_archives: 5,
            timezone: LogTimezone::Utc,
        }
    }
}

impl LogDestination {
    /// Resolves `logtarget` and `logfile` into a destination.
    ///
    /// Callers validate the combination first; an unusable pair resolves to
    /// standard error.
    #[must_use]
    pub fn resolve(target: LogTarget, logfile: &str) -> Self {
        let logfile = logfile.trim();
        match target {
            LogTarget::File | LogTarget::Auto if !logfile.is_empty() => {
                LogDestination::File(PathBuf::from(logfile))
            }
            _ => LogDestination::Stderr,
        }
    }
}
