// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shutdown coordination.
//!
//! Termination requests (Ctrl+C, SIGTERM, or [`FleetHandle::shutdown`]) all
//! land on one trigger token; the first one wins and later ones are no-ops.
//! The coordinator then cancels the fleet token and joins every unit. The
//! fleet token is always cancelled before the first join starts.
//!
//! Signal handlers are installed by [`ShutdownCoordinator::listen`], which the
//! supervisor calls before spawning any agent. A signal delivered between
//! launch and the wait is recorded and ends the wait as soon as it starts.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::supervisor::{advance, FleetReport, RunSet, UnitReport, UnitState};

/// What ended the wait for termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// [`FleetHandle::shutdown`]
    Requested,
}

type SharedReason = Arc<OnceLock<ShutdownReason>>;

fn request(trigger: &CancellationToken, reason: &SharedReason, received: ShutdownReason) {
    reason.get_or_init(|| received);
    trigger.cancel();
}

/// Cloneable handle for requesting fleet shutdown.
///
/// # Examples
///
/// ```
/// use fleet_core::Supervisor;
///
/// let supervisor = Supervisor::new();
/// let handle = supervisor.handle();
///
/// handle.shutdown();
/// handle.clone().shutdown(); // no further effect
/// assert!(handle.is_shutdown_requested());
/// ```
#[derive(Debug, Clone)]
pub struct FleetHandle {
    trigger: CancellationToken,
    reason: SharedReason,
}

impl FleetHandle {
    /// Requests shutdown. Calling it again has no further effect.
    pub fn shutdown(&self) {
        request(&self.trigger, &self.reason, ShutdownReason::Requested);
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.trigger.is_cancelled()
    }
}

/// Turns a termination request into cancel-then-join.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    trigger: CancellationToken,
    reason: SharedReason,
    fleet_token: CancellationToken,
    timeout: Option<Duration>,
    listener: Option<JoinHandle<()>>,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(fleet_token: CancellationToken) -> Self {
        Self {
            trigger: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
            fleet_token,
            timeout: None,
            listener: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn handle(&self) -> FleetHandle {
        FleetHandle {
            trigger: self.trigger.clone(),
            reason: Arc::clone(&self.reason),
        }
    }

    /// Installs the SIGINT and SIGTERM handlers. From this call on, a signal
    /// is a termination request rather than the default process exit.
    ///
    /// Idempotent. Must be called from within a tokio runtime.
    pub fn listen(&mut self) {
        if self.listener.is_none() {
            self.listener = Some(spawn_signal_listener(
                self.trigger.clone(),
                Arc::clone(&self.reason),
            ));
            debug!("listening for termination signals");
        }
    }

    /// Waits for the first termination request.
    pub async fn wait_for_termination(&mut self) -> ShutdownReason {
        self.listen();
        self.trigger.cancelled().await;
        self.reason
            .get()
            .copied()
            .unwrap_or(ShutdownReason::Requested)
    }

    /// Cancels the fleet and waits until every unit is terminal.
    ///
    /// With a timeout configured, units still running at the deadline are
    /// aborted and reported as failed. They are joined all the same, so no
    /// task outlives this call.
    pub async fn shutdown(&self, run_set: RunSet) -> FleetReport {
        info!("stopping");
        self.trigger.cancel();
        self.fleet_token.cancel();
        run_set.mark_cancelling();
        if let Some(listener) = &self.listener {
            listener.abort();
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let units = run_set.into_units();
        debug!("waiting for {} agents to stop", units.len());

        let mut report = FleetReport::default();
        for unit in units {
            let mut handle = unit.handle;
            let joined = match deadline {
                None => Some((&mut handle).await),
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await.ok(),
            };
            let result = match joined {
                Some(result) => result,
                None => {
                    warn!(
                        "agent for {} did not stop before the shutdown timeout, aborting",
                        unit.source
                    );
                    handle.abort();
                    handle.await
                }
            };

            if let Err(e) = result {
                if e.is_panic() {
                    error!("agent for {} panicked: {}", unit.source, e);
                }
                advance(&unit.state, UnitState::Failed);
            }

            let state = *unit.state.borrow();
            report.units.push(UnitReport {
                source: unit.source,
                state,
            });
        }

        info!(
            "stopped: {} agents completed, {} failed",
            report.completed(),
            report.failed()
        );
        report
    }
}

/// Registers the signal streams right away, then waits on them in a task.
/// The streams buffer a delivery that happens before the task is polled.
#[cfg(unix)]
fn spawn_signal_listener(trigger: CancellationToken, reason: SharedReason) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, Signal, SignalKind};

    fn register(kind: SignalKind, name: &str) -> Option<Signal> {
        match signal(kind) {
            Ok(stream) => Some(stream),
            Err(e) => {
                error!("failed to listen for {name}: {e}");
                None
            }
        }
    }

    async fn recv(stream: Option<&mut Signal>) {
        if let Some(stream) = stream {
            if stream.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    let mut interrupt = register(SignalKind::interrupt(), "SIGINT");
    let mut terminate = register(SignalKind::terminate(), "SIGTERM");
    tokio::spawn(async move {
        let received = tokio::select! {
            () = trigger.cancelled() => return,
            () = recv(interrupt.as_mut()) => ShutdownReason::Interrupt,
            () = recv(terminate.as_mut()) => ShutdownReason::Terminate,
        };
        request(&trigger, &reason, received);
    })
}

#[cfg(not(unix))]
fn spawn_signal_listener(trigger: CancellationToken, reason: SharedReason) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = trigger.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => request(&trigger, &reason, ShutdownReason::Interrupt),
                Err(e) => error!("failed to listen for Ctrl+C: {e}"),
            },
        }
    })
}
