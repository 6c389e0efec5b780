// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock agents and runtimes for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fleet_core::{Agent, AgentRuntime, Config};
use tokio_util::sync::CancellationToken;

/// Shared counters observed by every [`RecordingAgent`] a runtime builds.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    names: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// `name` tags of every agent that started, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.names.lock().expect("poisoned").clone();
        names.sort();
        names
    }
}

/// Agent that records its start, waits for cancellation, then records its stop.
pub struct RecordingAgent {
    name: String,
    recorder: Recorder,
}

#[async_trait::async_trait]
impl Agent for RecordingAgent {
    async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.recorder
            .names
            .lock()
            .expect("poisoned")
            .push(self.name.clone());
        self.recorder.started.fetch_add(1, Ordering::SeqCst);
        shutdown.cancelled().await;
        self.recorder.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runtime building a [`RecordingAgent`] named after the `name` global tag.
#[derive(Debug, Clone, Default)]
pub struct RecordingRuntime {
    pub recorder: Recorder,
}

impl AgentRuntime for RecordingRuntime {
    fn construct(&self, config: Config) -> Box<dyn Agent> {
        Box::new(RecordingAgent {
            name: config.global_tags.get("name").cloned().unwrap_or_default(),
            recorder: self.recorder.clone(),
        })
    }
}
