// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Fleet Core
//!
//! Runs a fleet of independently configured telemetry collection agents inside a
//! single process.
//!
//! ## Overview
//!
//! The bootstrap is a short pipeline:
//! 1. [`logger`]: load the top-level config and install the global subscriber
//! 2. [`discovery`]: walk the config directory for `*.conf` candidates
//! 3. [`agent`]: load one configuration per candidate and bind it to an agent
//! 4. [`supervisor`]: spawn one task per agent, all sharing one cancellation token
//! 5. [`shutdown`]: wait for a termination request, cancel, then join every task
//!
//! Failures while loading a single file or while running a single agent are
//! logged and absorbed. Only the top-level config and the directory walk are fatal.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

/// Agent seam, runtime seam and the per-file factory
pub mod agent;

/// Configuration documents: loading, validation and log settings
pub mod config;

/// Configuration directory walking
pub mod discovery;

/// Error types shared across the bootstrap
pub mod error;

/// Logging bootstrap and the log line formatter
pub mod logger;

/// Built-in agent runtime
pub mod runtime;

/// Termination triggers and the cancel-then-join coordinator
pub mod shutdown;

/// Fan-out of agents into supervised tasks
pub mod supervisor;

pub use agent::{Agent, AgentFactory, AgentRuntime, BoundAgent, ConfigFile};
pub use config::{Config, ConfigLoader, FileConfigLoader};
pub use discovery::walk_directory;
pub use error::{ConfigError, ConfigLoadError, DiscoveryError, LoggerError};
pub use logger::{setup_logger, LoggerGuard};
pub use shutdown::{FleetHandle, ShutdownCoordinator, ShutdownReason};
pub use supervisor::{FleetReport, RunSet, Supervisor, UnitReport, UnitState};

/// Version reported in the startup banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the startup banner at INFO level.
///
/// Called once the global subscriber is installed so the line lands in the
/// configured log target.
pub fn log_build_info() {
    tracing::info!("Starting fleet-supervisor {}", VERSION);
}
