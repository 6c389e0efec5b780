// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while walking the configuration directory.
///
/// Only problems with the root directory itself surface here; unreadable
/// nested entries are logged and skipped by the walker.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("config directory {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("config directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read config directory {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Underlying cause of a configuration that could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Parse(Box::new(e))
    }
}

/// A configuration file that could not be turned into a [`crate::Config`].
///
/// Always carries the offending path so the report can name the file.
#[derive(Debug, thiserror::Error)]
#[error("error loading config {}: {source}", .path.display())]
pub struct ConfigLoadError {
    pub path: PathBuf,
    #[source]
    pub source: ConfigError,
}

impl ConfigLoadError {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<ConfigError>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Errors from the logging bootstrap. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install global subscriber: {0}")]
    AlreadyInitialized(String),
}
