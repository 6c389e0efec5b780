// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Built-in agent runtime.
//!
//! Plugins are not part of this crate, so the built-in agent only drives the
//! collection schedule: it gathers every configured input each `interval` and
//! flushes each `flush_interval`, until its cancellation token fires.

use std::collections::BTreeMap;

use anyhow::bail;
use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{Agent, AgentRuntime};
use crate::config::Config;

/// Runtime that builds a [`CollectionAgent`] per configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRuntime;

impl AgentRuntime for DefaultRuntime {
    fn construct(&self, config: Config) -> Box<dyn Agent> {
        Box::new(CollectionAgent::new(config))
    }
}

/// Counters kept by a [`CollectionAgent`] across its run.
///
/// Read them with [`CollectionAgent::stats`] once `run` has returned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    /// Completed gather rounds, one per `interval` tick.
    pub gathers: u64,
    /// Completed flushes, including the final one on cancellation.
    pub flushes: u64,
}

/// Agent that runs the gather/flush schedule of one configuration.
#[derive(Debug)]
pub struct CollectionAgent {
    config: Config,
    tags: BTreeMap<String, String>,
    stats: CollectionStats,
}

impl CollectionAgent {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let tags = config.tags();
        Self {
            config,
            tags,
            stats: CollectionStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        self.stats
    }

    fn gather(&mut self) {
        for (name, instances) in &self.config.inputs {
            debug!(
                "gathering input {} ({} instances, {} tags)",
                name,
                instances.len(),
                self.tags.len()
            );
        }
        self.stats.gathers += 1;
    }

    fn flush(&mut self) {
        for name in self.config.outputs.keys() {
            debug!("flushing output {}", name);
        }
        self.stats.flushes += 1;
    }
}

#[async_trait]
impl Agent for CollectionAgent {
    async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        if self.config.input_count() == 0 {
            bail!("no inputs found, did you provide a valid config file?");
        }

        info!(
            "loaded inputs: {}",
            self.config.inputs.keys().cloned().collect::<Vec<_>>().join(" ")
        );
        info!(
            "loaded outputs: {}",
            self.config.outputs.keys().cloned().collect::<Vec<_>>().join(" ")
        );

        let mut gather_interval = interval(self.config.agent.interval);
        gather_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flush_interval = interval(self.config.agent.flush_interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("cancellation received, final flush");
                    self.flush();
                    break;
                }
                _ = gather_interval.tick() => self.gather(),
                _ = flush_interval.tick() => self.flush(),
            }
        }

        info!(
            "agent stopped after {} gathers and {} flushes",
            self.stats.gathers, self.stats.flushes
        );
        Ok(())
    }
}
