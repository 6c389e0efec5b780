// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agents and the per-file agent factory.
//!
//! An [`Agent`] is whatever the [`AgentRuntime`] builds from one [`Config`].
//! The factory loads every discovered file independently: a file that fails to
//! load is reported and skipped, it never stops the files after it.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{Config, ConfigLoader};
pub use crate::discovery::ConfigFile;
use crate::error::ConfigLoadError;

/// One independently configured collection unit.
#[async_trait]
pub trait Agent: Send {
    /// Runs until the agent stops on its own or `shutdown` is cancelled.
    ///
    /// Implementations must return in bounded time once `shutdown` fires;
    /// graceful shutdown joins on this future.
    async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()>;
}

/// Builds agents from configurations.
pub trait AgentRuntime: Send + Sync {
    fn construct(&self, config: Config) -> Box<dyn Agent>;
}

/// An agent together with the file it was built from.
pub struct BoundAgent {
    pub source: ConfigFile,
    pub agent: Box<dyn Agent>,
}

impl std::fmt::Debug for BoundAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAgent")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Loads configurations and binds each one to a freshly constructed agent.
pub struct AgentFactory<L, R> {
    loader: L,
    runtime: R,
}

impl<L, R> AgentFactory<L, R>
where
    L: ConfigLoader,
    R: AgentRuntime,
{
    pub fn new(loader: L, runtime: R) -> Self {
        Self { loader, runtime }
    }

    /// Loads one file and constructs its agent.
    pub fn load_agent(&self, file: ConfigFile) -> Result<BoundAgent, ConfigLoadError> {
        let config = self.loader.load(file.path())?;
        debug!(
            "loaded config {} with {} inputs and {} outputs",
            file,
            config.input_count(),
            config.output_count()
        );
        let agent = self.runtime.construct(config);
        Ok(BoundAgent {
            source: file,
            agent,
        })
    }

    /// Builds the fleet in discovery order, logging and skipping every file
    /// that fails to load. An empty result is not an error.
    pub fn build_fleet(&self, files: Vec<ConfigFile>) -> Vec<BoundAgent> {
        let candidates = files.len();
        let mut fleet = Vec::with_capacity(candidates);
        for file in files {
            match self.load_agent(file) {
                Ok(bound) => fleet.push(bound),
                Err(e) => {
                    error!("error when loading config {}: {}", e.path.display(), e.source);
                }
            }
        }
        info!(
            "built {} agents from {} config files",
            fleet.len(),
            candidates
        );
        fleet
    }
}
