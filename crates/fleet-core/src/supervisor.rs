// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fleet supervisor.
//!
//! The supervisor spawns one tokio task per agent. Every task receives a child
//! of the fleet cancellation token, so an agent may cancel itself without
//! touching its siblings while fleet-wide cancellation still reaches all of
//! them. Each join handle enters the [`RunSet`] inside `spawn`, so every unit
//! is registered before `launch` returns and a shutdown that starts right
//! after it still waits for all of them.
//!
//! `launch` installs the termination signal handlers before the first spawn.
//! A panicking agent is caught inside its own unit and marked `Failed` right
//! away, like an agent that returned an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::agent::BoundAgent;
use crate::discovery::ConfigFile;
use crate::shutdown::{FleetHandle, ShutdownCoordinator};

/// Lifecycle of one agent execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Registered, task not yet polled.
    Starting,
    /// Agent `run` in progress.
    Running,
    /// Fleet cancellation fired, waiting for `run` to return.
    Cancelling,
    /// `run` returned `Ok`.
    Completed,
    /// `run` returned an error, panicked, or was aborted.
    Failed,
}

impl UnitState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Completed | UnitState::Failed)
    }

    /// Moves to `next` if the transition is allowed. Terminal states never
    /// change and a unit never goes back to `Running` once cancelling.
    ///
    /// Returns whether the state changed.
    ///
    /// # Examples
    ///
    /// ```
    /// use fleet_core::UnitState;
    ///
    /// let mut state = UnitState::Starting;
    /// assert!(state.advance(UnitState::Running));
    /// assert!(state.advance(UnitState::Cancelling));
    ///
    /// // cancellation is one way
    /// assert!(!state.advance(UnitState::Running));
    ///
    /// assert!(state.advance(UnitState::Completed));
    /// assert!(!state.advance(UnitState::Failed));
    /// assert_eq!(state, UnitState::Completed);
    /// ```
    pub fn advance(&mut self, next: UnitState) -> bool {
        let allowed = match (*self, next) {
            (UnitState::Starting, UnitState::Running)
            | (UnitState::Starting | UnitState::Running, UnitState::Cancelling) => true,
            (from, UnitState::Completed | UnitState::Failed) => !from.is_terminal(),
            _ => false,
        };
        if allowed {
            *self = next;
        }
        allowed
    }
}

pub(crate) type SharedState = Arc<watch::Sender<UnitState>>;

pub(crate) fn advance(state: &SharedState, next: UnitState) -> bool {
    state.send_if_modified(|current| current.advance(next))
}

/// Aborts the inner agent task when the unit task is dropped or aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One spawned agent task.
#[derive(Debug)]
pub(crate) struct RunUnit {
    pub(crate) source: ConfigFile,
    pub(crate) state: SharedState,
    pub(crate) handle: JoinHandle<()>,
}

/// The set of spawned execution units, owned by the supervisor until
/// shutdown drains it.
#[derive(Debug, Default)]
pub struct RunSet {
    units: Vec<RunUnit>,
}

impl RunSet {
    /// Total units ever registered, terminal ones included. Units are never
    /// removed before shutdown drains the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units that have not reached a terminal state yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| !unit.state.borrow().is_terminal())
            .count()
    }

    /// Snapshot of every unit's current state, in launch order.
    #[must_use]
    pub fn states(&self) -> Vec<UnitReport> {
        self.units
            .iter()
            .map(|unit| UnitReport {
                source: unit.source.clone(),
                state: *unit.state.borrow(),
            })
            .collect()
    }

    pub(crate) fn mark_cancelling(&self) {
        for unit in &self.units {
            advance(&unit.state, UnitState::Cancelling);
        }
    }

    pub(crate) fn into_units(self) -> Vec<RunUnit> {
        self.units
    }

    /// Adds a unit whose task is already spawned. Called by
    /// [`Supervisor::spawn`] before it returns.
    fn register(&mut self, unit: RunUnit) {
        self.units.push(unit);
    }
}

/// Final state of one unit after shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub source: ConfigFile,
    pub state: UnitState,
}

/// Outcome of a graceful shutdown. Every unit in it is terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetReport {
    pub units: Vec<UnitReport>,
}

impl FleetReport {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(UnitState::Completed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(UnitState::Failed)
    }

    fn count(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state == state).count()
    }
}

/// Owns the fleet cancellation token, the run set and the shutdown
/// coordinator.
///
/// # Examples
///
/// ```
/// use fleet_core::{Agent, BoundAgent, ConfigFile, Supervisor, UnitState};
/// use tokio_util::sync::CancellationToken;
///
/// struct Idle;
///
/// #[async_trait::async_trait]
/// impl Agent for Idle {
///     async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
///         shutdown.cancelled().await;
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut supervisor = Supervisor::new();
/// supervisor.launch(vec![BoundAgent {
///     source: ConfigFile::new("conf.d/cpu.conf"),
///     agent: Box::new(Idle),
/// }]);
///
/// // usually a SIGINT or SIGTERM
/// supervisor.handle().shutdown();
///
/// let report = supervisor.run_until_shutdown().await;
/// assert_eq!(report.units[0].state, UnitState::Completed);
/// # }
/// ```
pub struct Supervisor {
    fleet_token: CancellationToken,
    run_set: RunSet,
    coordinator: ShutdownCoordinator,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        let fleet_token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::new(fleet_token.clone());
        Self {
            fleet_token,
            run_set: RunSet::default(),
            coordinator,
        }
    }

    /// Bounds how long shutdown waits before aborting agents that ignore
    /// cancellation. `None` waits forever.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.coordinator = self.coordinator.with_timeout(timeout);
        self
    }

    /// Handle for requesting shutdown from elsewhere in the process.
    #[must_use]
    pub fn handle(&self) -> FleetHandle {
        self.coordinator.handle()
    }

    #[must_use]
    pub fn run_set(&self) -> &RunSet {
        &self.run_set
    }

    /// Spawns one execution unit per agent, in order.
    ///
    /// Termination signals are listened for before the first unit starts, so
    /// a SIGTERM that arrives during or right after launch is turned into a
    /// graceful shutdown instead of killing the process.
    ///
    /// # Arguments
    ///
    /// * `fleet` - Agents built by [`crate::AgentFactory::build_fleet`]. May
    ///   be empty.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn launch(&mut self, fleet: Vec<BoundAgent>) {
        self.coordinator.listen();
        for bound in fleet {
            self.spawn(bound);
        }
        info!("started {} agents", self.run_set.len());
    }

    /// Spawns a single execution unit and registers it in the [`RunSet`].
    ///
    /// The unit runs `agent.run` with a child of the fleet token inside an
    /// `agent{config=...}` span and records the outcome in its state:
    /// `Completed` on `Ok`, `Failed` on an error or a panic. Failures are
    /// logged with the config path and never reach sibling units.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(&mut self, bound: BoundAgent) {
        let BoundAgent { source, mut agent } = bound;
        let (state_tx, _) = watch::channel(UnitState::Starting);
        let state = Arc::new(state_tx);
        let token = self.fleet_token.child_token();

        let unit_state = Arc::clone(&state);
        let unit_source = source.clone();
        let span = info_span!("agent", config = %source);
        let handle = tokio::spawn(
            async move {
                advance(&unit_state, UnitState::Running);
                debug!("agent running");

                // inner task: a panic comes back as a JoinError
                let run = tokio::spawn(async move { agent.run(token).await }.in_current_span());
                let _abort_run = AbortOnDrop(run.abort_handle());
                match run.await {
                    Ok(Ok(())) => {
                        debug!("agent stopped");
                        advance(&unit_state, UnitState::Completed);
                    }
                    Ok(Err(e)) => {
                        error!("error when running config {}: {:#}", unit_source, e);
                        advance(&unit_state, UnitState::Failed);
                    }
                    Err(e) => {
                        error!("agent for {} panicked: {}", unit_source, e);
                        advance(&unit_state, UnitState::Failed);
                    }
                }
            }
            .instrument(span),
        );

        self.run_set.register(RunUnit {
            source,
            state,
            handle,
        });
    }

    /// Blocks until a termination request arrives, then shuts the fleet
    /// down.
    pub async fn run_until_shutdown(mut self) -> FleetReport {
        let reason = self.coordinator.wait_for_termination().await;
        info!("shutdown requested: {reason:?}");
        self.shutdown().await
    }

    /// Cancels every agent and waits for all units to finish.
    pub async fn shutdown(self) -> FleetReport {
        self.coordinator.shutdown(self.run_set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_test::traced_test;

    const TEST_DEADLINE: Duration = Duration::from_secs(5);

    struct WaitingAgent {
        observed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Agent for WaitingAgent {
        async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
            shutdown.cancelled().await;
            self.observed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        async fn run(&mut self, _shutdown: CancellationToken) -> anyhow::Result<()> {
            anyhow::bail!("no inputs found")
        }
    }

    fn bound(name: &str, agent: impl Agent + 'static) -> BoundAgent {
        BoundAgent {
            source: ConfigFile::new(format!("conf.d/{name}.conf")),
            agent: Box::new(agent),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut state = UnitState::Starting;
        assert!(state.advance(UnitState::Running));
        assert!(state.advance(UnitState::Cancelling));
        assert!(!state.advance(UnitState::Running));
        assert!(state.advance(UnitState::Completed));
        assert!(!state.advance(UnitState::Failed));
        assert!(!state.advance(UnitState::Running));
        assert_eq!(state, UnitState::Completed);

        let mut state = UnitState::Running;
        assert!(state.advance(UnitState::Failed));
        assert!(!state.advance(UnitState::Cancelling));
        assert_eq!(state, UnitState::Failed);

        let mut state = UnitState::Starting;
        assert!(state.advance(UnitState::Cancelling));
        assert!(!state.advance(UnitState::Running));
    }

    #[tokio::test]
    async fn test_every_agent_observes_cancellation() {
        let mut supervisor = Supervisor::new();
        let flags: Vec<Arc<AtomicBool>> = (0..4).map(|_| Arc::new(AtomicBool::new(false))).collect();
        supervisor.launch(
            flags
                .iter()
                .enumerate()
                .map(|(i, observed)| {
                    bound(
                        &format!("agent-{i}"),
                        WaitingAgent {
                            observed: Arc::clone(observed),
                        },
                    )
                })
                .collect(),
        );
        assert_eq!(supervisor.run_set().len(), 4);

        let report = tokio::time::timeout(TEST_DEADLINE, supervisor.shutdown())
            .await
            .expect("shutdown should finish");

        assert_eq!(report.completed(), 4);
        assert!(report.units.iter().all(|u| u.state.is_terminal()));
        assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_agent_does_not_affect_siblings() {
        let mut supervisor = Supervisor::new();
        let observed = Arc::new(AtomicBool::new(false));
        supervisor.launch(vec![
            bound("broken", FailingAgent),
            bound(
                "healthy",
                WaitingAgent {
                    observed: Arc::clone(&observed),
                },
            ),
        ]);

        // the failing unit finishes on its own; the healthy one keeps running
        tokio::time::timeout(TEST_DEADLINE, async {
            while supervisor.run_set().outstanding() > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("failing agent should finish");
        assert!(!observed.load(Ordering::SeqCst));
        assert!(!supervisor.handle().is_shutdown_requested());

        let report = tokio::time::timeout(TEST_DEADLINE, supervisor.shutdown())
            .await
            .expect("shutdown should finish");
        assert_eq!(report.failed(), 1);
        assert_eq!(report.completed(), 1);
        assert_eq!(report.units[0].state, UnitState::Failed);
        assert!(observed.load(Ordering::SeqCst));
        assert!(logs_contain("error when running config conf.d/broken.conf"));
        assert!(logs_contain("no inputs found"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_agent_fails_without_waiting_for_shutdown() {
        struct PanickingAgent;

        #[async_trait]
        impl Agent for PanickingAgent {
            async fn run(&mut self, _shutdown: CancellationToken) -> anyhow::Result<()> {
                panic!("plugin bug");
            }
        }

        let mut supervisor = Supervisor::new();
        let observed = Arc::new(AtomicBool::new(false));
        supervisor.launch(vec![
            bound("panicky", PanickingAgent),
            bound(
                "healthy",
                WaitingAgent {
                    observed: Arc::clone(&observed),
                },
            ),
        ]);

        tokio::time::timeout(TEST_DEADLINE, async {
            while supervisor.run_set().outstanding() > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("panicking unit should become terminal");
        assert_eq!(supervisor.run_set().states()[0].state, UnitState::Failed);
        assert!(!observed.load(Ordering::SeqCst));
        assert!(logs_contain("agent for conf.d/panicky.conf panicked"));

        let report = tokio::time::timeout(TEST_DEADLINE, supervisor.shutdown())
            .await
            .expect("shutdown should finish");
        assert_eq!(report.failed(), 1);
        assert_eq!(report.completed(), 1);
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_agent_cancelling_itself_leaves_siblings_running() {
        struct SelfCancellingAgent;

        #[async_trait]
        impl Agent for SelfCancellingAgent {
            async fn run(&mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
                shutdown.cancel();
                Ok(())
            }
        }

        let mut supervisor = Supervisor::new();
        let observed = Arc::new(AtomicBool::new(false));
        supervisor.launch(vec![
            bound("oneshot", SelfCancellingAgent),
            bound(
                "steady",
                WaitingAgent {
                    observed: Arc::clone(&observed),
                },
            ),
        ]);

        tokio::time::timeout(TEST_DEADLINE, async {
            while supervisor.run_set().outstanding() > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("self-cancelling agent should finish");
        assert!(!observed.load(Ordering::SeqCst));

        let report = supervisor.shutdown().await;
        assert_eq!(report.completed(), 2);
    }

    #[tokio::test]
    async fn test_empty_fleet_shuts_down_immediately() {
        let mut supervisor = Supervisor::new();
        supervisor.launch(Vec::new());
        assert!(supervisor.run_set().is_empty());

        let report = tokio::time::timeout(Duration::from_millis(100), supervisor.shutdown())
            .await
            .expect("empty fleet should not wait");
        assert_eq!(report, FleetReport::default());
    }

    #[tokio::test]
    async fn test_states_snapshot() {
        let mut supervisor = Supervisor::new();
        supervisor.launch(vec![bound(
            "cpu",
            WaitingAgent {
                observed: Arc::new(AtomicBool::new(false)),
            },
        )]);

        let states = supervisor.run_set().states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].source, ConfigFile::new("conf.d/cpu.conf"));
        assert!(!states[0].state.is_terminal());
        assert_eq!(supervisor.run_set().outstanding(), 1);

        supervisor.shutdown().await;
    }
}
