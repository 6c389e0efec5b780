// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! Each agent is described by one TOML document. The same format is used for
//! the top-level config file, from which only the logging settings are read.
//!
//! ## Document layout
//!
//! ```toml
//! [global_tags]
//!   dc = "us-east-1"
//!
//! [agent]
//!   interval = "10s"
//!   flush_interval = "10s"
//!   debug = false
//!   quiet = false
//!   logtarget = "file"
//!   logfile = "/var/log/telegraf/telegraf.log"
//!   logfile_rotation_interval = "24h"
//!   logfile_rotation_max_archives = 5
//!
//! [[inputs.cpu]]
//!   percpu = true
//!
//! [[outputs.file]]
//!   files = ["stdout"]
//! ```
//!
//! Plugin tables (`inputs`, `outputs`, `processors`, `aggregators`) are kept
//! opaque; the agent runtime decides what to do with them.
//!
//! ## Edge Cases and Behaviors
//!
//! - **Environment variables**: `${VAR}` and `$VAR` are substituted before
//!   parsing. Unset variables are left as written.
//! - **Unknown `[agent]` keys**: ignored
//! - **Durations**: Go-style strings or integer seconds, see [`deserialize`]
//! - **Empty document**: valid, every field takes its default

pub mod deserialize;
pub mod log_level;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Format, Toml},
    value::Value,
    Figment,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::config::{
    deserialize::{deserialize_duration, deserialize_optional_duration, deserialize_size},
    log_level::{LogDestination, LogLevel, LogSettings, LogTarget, LogTimezone},
};
use crate::error::{ConfigError, ConfigLoadError};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_ROTATION_MAX_ARCHIVES: i64 = 5;

lazy_static! {
    static ref ENV_VAR_REGEX: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("failed creating regex");
}

/// Opaque plugin sections, keyed by plugin name. Each name may appear more
/// than once (`[[inputs.cpu]]` twice gives two entries).
pub type PluginTables = BTreeMap<String, Vec<Value>>;

/// The `[agent]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub flush_interval: Duration,
    pub hostname: String,
    pub omit_hostname: bool,

    // Logging
    pub debug: bool,
    pub quiet: bool,
    pub logtarget: LogTarget,
    pub logfile: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub logfile_rotation_interval: Duration,
    #[serde(deserialize_with = "deserialize_size")]
    pub logfile_rotation_max_size: u64,
    pub logfile_rotation_max_archives: i64,
    pub log_with_timezone: String,

    /// How long shutdown waits for agents before aborting them. Only read from
    /// the top-level config. `None` waits forever.
    #[serde(deserialize_with = "deserialize_optional_duration")]
    pub shutdown_timeout: Option<Duration>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            hostname: String::new(),
            omit_hostname: false,
            debug: false,
            quiet: false,
            logtarget: LogTarget::Auto,
            logfile: String::new(),
            logfile_rotation_interval: Duration::ZERO,
            logfile_rotation_max_size: 0,
            logfile_rotation_max_archives: DEFAULT_ROTATION_MAX_ARCHIVES,
            log_with_timezone: String::new(),
            shutdown_timeout: None,
        }
    }
}

/// A parsed and validated configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSettings,
    pub global_tags: BTreeMap<String, String>,
    pub inputs: PluginTables,
    pub outputs: PluginTables,
    pub processors: PluginTables,
    pub aggregators: PluginTables,
}

impl Config {
    /// Reads, expands, parses and validates the document at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigLoadError::new(path, e))?;
        Self::from_toml_str(&contents).map_err(|e| ConfigLoadError::new(path, e))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents);
        let config: Config = Figment::new()
            .merge(Toml::string(&expanded))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "agent interval must be greater than 0".to_string(),
            ));
        }
        if self.agent.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "agent flush_interval must be greater than 0".to_string(),
            ));
        }
        match self.agent.logtarget {
            LogTarget::File if self.agent.logfile.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "logtarget is 'file' but no logfile is set".to_string(),
                ));
            }
            LogTarget::EventLog => {
                return Err(ConfigError::Invalid(
                    "logtarget 'eventlog' is only available on Windows".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Logging settings for the process-wide subscriber.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            level: LogLevel::from_flags(self.agent.debug, self.agent.quiet),
            destination: LogDestination::resolve(self.agent.logtarget, &self.agent.logfile),
            rotation_interval: self.agent.logfile_rotation_interval,
            rotation_max_size: self.agent.logfile_rotation_max_size,
            rotation_max_archives: self.agent.logfile_rotation_max_archives,
            timezone: LogTimezone::from(self.agent.log_with_timezone.as_str()),
        }
    }

    /// Tags attached to everything this agent gathers: `global_tags` plus
    /// `host`, unless `omit_hostname` is set or no hostname is configured.
    #[must_use]
    pub fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.global_tags.clone();
        let hostname = self.agent.hostname.trim();
        if !self.agent.omit_hostname && !hostname.is_empty() {
            tags.entry("host".to_string())
                .or_insert_with(|| hostname.to_string());
        }
        tags
    }

    /// Number of input plugin instances declared in the document.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.values().map(Vec::len).sum()
    }
}

/// Substitutes `${VAR}` and `$VAR` with values from the process environment.
pub fn expand_env_vars(contents: &str) -> Cow<'_, str> {
    ENV_VAR_REGEX.replace_all(contents, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    })
}

/// Produces a [`Config`] for a path. The seam the agent factory loads through.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Config, ConfigLoadError>;
}

/// Loads TOML documents from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigLoader;

impl ConfigLoader for FileConfigLoader {
    fn load(&self, path: &Path) -> Result<Config, ConfigLoadError> {
        Config::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").expect("empty document should load");
        assert_eq!(config.agent, AgentSettings::default());
        assert_eq!(config.input_count(), 0);
        assert_eq!(config.log_settings(), LogSettings::default());
    }

    #[test]
    fn test_full_document() {
        let config = Config::from_toml_str(
            r#"
            [global_tags]
              dc = "us-east-1"

            [agent]
              interval = "5s"
              flush_interval = 15
              hostname = "collector-01"
              debug = true
              logtarget = "file"
              logfile = "/var/log/telegraf.log"
              logfile_rotation_interval = "24h"
              logfile_rotation_max_size = "10MB"
              logfile_rotation_max_archives = -1
              log_with_timezone = "local"
              metric_batch_size = 1000

            [[inputs.cpu]]
              percpu = true

            [[inputs.cpu]]
              totalcpu = false

            [[inputs.mem]]

            [[outputs.file]]
              files = ["stdout"]
            "#,
        )
        .expect("document should load");

        assert_eq!(config.agent.interval, Duration::from_secs(5));
        assert_eq!(config.agent.flush_interval, Duration::from_secs(15));
        assert_eq!(config.input_count(), 3);
        assert_eq!(config.output_count(), 1);
        assert_eq!(config.inputs.keys().collect::<Vec<_>>(), vec!["cpu", "mem"]);

        let settings = config.log_settings();
        assert_eq!(settings.level, LogLevel::Debug);
        assert_eq!(
            settings.destination,
            LogDestination::File(PathBuf::from("/var/log/telegraf.log"))
        );
        assert_eq!(settings.rotation_interval, Duration::from_secs(86_400));
        assert_eq!(settings.rotation_max_size, 10_000_000);
        assert_eq!(settings.rotation_max_archives, -1);
        assert_eq!(settings.timezone, LogTimezone::Local);

        let tags = config.tags();
        assert_eq!(tags.get("dc").map(String::as_str), Some("us-east-1"));
        assert_eq!(tags.get("host").map(String::as_str), Some("collector-01"));
    }

    #[test]
    fn test_omit_hostname() {
        let config = Config::from_toml_str(
            r#"
            [agent]
              hostname = "collector-01"
              omit_hostname = true
            "#,
        )
        .expect("document should load");
        assert!(!config.tags().contains_key("host"));
    }

    #[test]
    fn test_invalid_syntax() {
        let result = Config::from_toml_str("[agent\ninterval = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_duration() {
        let result = Config::from_toml_str("[agent]\ninterval = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = Config::from_toml_str("[agent]\ninterval = \"0s\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_file_target_requires_logfile() {
        let result = Config::from_toml_str("[agent]\nlogtarget = \"file\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_eventlog_target_rejected() {
        let result = Config::from_toml_str("[agent]\nlogtarget = \"eventlog\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_shutdown_timeout() {
        let config = Config::from_toml_str("[agent]\nshutdown_timeout = \"30s\"")
            .expect("document should load");
        assert_eq!(config.agent.shutdown_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    #[serial]
    fn test_env_var_expansion() {
        std::env::set_var("FLEET_TEST_HOSTNAME", "expanded-host");
        std::env::remove_var("FLEET_TEST_UNSET");

        let expanded = expand_env_vars("a=${FLEET_TEST_HOSTNAME} b=$FLEET_TEST_HOSTNAME c=$FLEET_TEST_UNSET");
        assert_eq!(
            expanded,
            "a=expanded-host b=expanded-host c=$FLEET_TEST_UNSET"
        );

        let config = Config::from_toml_str("[agent]\nhostname = \"${FLEET_TEST_HOSTNAME}\"")
            .expect("document should load");
        assert_eq!(config.agent.hostname, "expanded-host");

        std::env::remove_var("FLEET_TEST_HOSTNAME");
    }

    #[test]
    fn test_from_file_missing_path_names_file() {
        let err = Config::from_file(Path::new("/nonexistent/telegraf.conf"))
            .expect_err("missing file should fail");
        assert_eq!(err.path, PathBuf::from("/nonexistent/telegraf.conf"));
        assert!(matches!(err.source, ConfigError::Io(_)));
    }

    #[test]
    fn test_file_loader() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("cpu.conf");
        std::fs::write(&path, "[[inputs.cpu]]\n").expect("failed to write config");

        let config = FileConfigLoader.load(&path).expect("config should load");
        assert_eq!(config.input_count(), 1);
    }
}
