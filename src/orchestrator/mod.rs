//! Supervision of the seednode, node and proxy processes of a configured
//! network.
//!
//! Every process runs in its own task and only its start time is staggered.
//! A single monitor task owns the [`CancellationToken`]: it cancels when the
//! configured duration elapses or the operator interrupts, and every
//! supervisor then kills its child and drains its output before returning.

mod log_phase;
mod process;

use std::future::Future;
use std::io;
use std::sync::Arc;

use futures::future::join_all;
use tokio::signal;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigRoot;
use crate::errors::LocalnetResult;

pub use log_phase::{LogPhase, GENESIS_COMMITTED_MARKER};
pub use process::{ProcessExit, ProcessReport, ProcessRole, ProcessSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartupPolicy {
    pub seednode_delay: Duration,
    pub nodes_delay: Duration,
    pub proxy_delay: Duration,
    pub monitor_tick: Duration,
    pub drain_timeout: Duration,
}

impl Default for StartupPolicy {
    fn default() -> Self {
        Self {
            seednode_delay: Duration::ZERO,
            nodes_delay: Duration::from_secs(1),
            proxy_delay: Duration::from_secs(10),
            monitor_tick: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl StartupPolicy {
    pub fn delay_for(&self, role: ProcessRole) -> Duration {
        match role {
            ProcessRole::Seednode => self.seednode_delay,
            ProcessRole::Node(_) => self.nodes_delay,
            ProcessRole::Proxy => self.proxy_delay,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Elapsed,
    Interrupted,
}

#[derive(Debug)]
pub struct RunReport {
    /// `None` when every process exited before the monitor stopped the run.
    pub stop: Option<StopReason>,
    pub processes: Vec<ProcessReport>,
}

impl RunReport {
    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().filter_map(|process| process.pid).collect()
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    processes: Vec<ProcessSpec>,
    policy: StartupPolicy,
    phase: Arc<LogPhase>,
}

impl Orchestrator {
    pub fn new(processes: Vec<ProcessSpec>, policy: StartupPolicy) -> Self {
        Self {
            processes,
            policy,
            phase: Arc::new(LogPhase::new()),
        }
    }

    /// Seednode, then every validator and observer, then the proxy. Fails
    /// before anything is spawned if one of the executables is missing.
    pub fn from_config(config: &ConfigRoot, policy: StartupPolicy) -> LocalnetResult<Self> {
        let mut processes = vec![ProcessSpec::seednode(config)?];
        for node in config.all_nodes() {
            processes.push(ProcessSpec::node(config, &node)?);
        }
        processes.push(ProcessSpec::proxy(config)?);

        for process in &processes {
            process.preflight()?;
        }
        Ok(Self::new(processes, policy))
    }

    pub fn processes(&self) -> &[ProcessSpec] {
        &self.processes
    }

    pub fn log_phase(&self) -> Arc<LogPhase> {
        self.phase.clone()
    }

    /// Runs until `stop_after` elapses, the operator presses Ctrl-C, or every
    /// process has exited. No child outlives the returned future.
    pub async fn run(self, stop_after: Option<Duration>) -> RunReport {
        self.run_until_interrupted(stop_after, signal::ctrl_c()).await
    }

    /// Same as [`Orchestrator::run`] with `interrupt` standing in for Ctrl-C.
    /// An `Err` from `interrupt` disables interruption for the rest of the run.
    pub async fn run_until_interrupted<F>(
        self,
        stop_after: Option<Duration>,
        interrupt: F,
    ) -> RunReport
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(monitor(
            cancel.clone(),
            stop_after,
            self.policy.monitor_tick,
            interrupt,
        ));

        let labels: Vec<String> = self
            .processes
            .iter()
            .map(|spec| spec.label.clone())
            .collect();
        let supervisors = self.processes.into_iter().map(|spec| {
            let delay = self.policy.delay_for(spec.role);
            tokio::spawn(process::supervise(
                spec,
                delay,
                self.phase.clone(),
                cancel.clone(),
                self.policy.drain_timeout,
            ))
        });
        let results = join_all(supervisors).await;

        // Every supervisor has returned, so nothing is left for the monitor to stop.
        monitor.abort();
        let stop = monitor.await.ok();

        let processes = labels
            .into_iter()
            .zip(results)
            .map(|(label, result)| match result {
                Ok(report) => report,
                Err(err) => {
                    warn!(
                        target = "localnet::orchestrator",
                        label = %label,
                        "supervisor failed: {err}"
                    );
                    ProcessReport {
                        label,
                        pid: None,
                        exit: ProcessExit::Failed(err.to_string()),
                    }
                }
            })
            .collect();

        info!(target = "localnet::orchestrator", stop = ?stop, "network stopped");
        RunReport { stop, processes }
    }
}

async fn monitor<F>(
    cancel: CancellationToken,
    stop_after: Option<Duration>,
    tick: Duration,
    interrupt: F,
) -> StopReason
where
    F: Future<Output = io::Result<()>>,
{
    let started = Instant::now();
    tokio::pin!(interrupt);
    let mut listening = true;
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            result = &mut interrupt, if listening => match result {
                Ok(()) => {
                    info!(
                        target = "localnet::orchestrator",
                        "interrupt received; stopping network"
                    );
                    break StopReason::Interrupted;
                }
                Err(err) => {
                    warn!(
                        target = "localnet::orchestrator",
                        "unable to listen for interrupts: {err}"
                    );
                    listening = false;
                }
            },
            _ = ticker.tick() => {
                if let Some(limit) = stop_after {
                    if started.elapsed() >= limit {
                        info!(
                            target = "localnet::orchestrator",
                            seconds = limit.as_secs(),
                            "run duration elapsed; stopping network"
                        );
                        break StopReason::Elapsed;
                    }
                }
            }
        }
    };

    cancel.cancel();
    reason
}
