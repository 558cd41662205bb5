use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::log_phase::LogPhase;
use crate::config::ConfigRoot;
use crate::errors::{LocalnetError, LocalnetResult};
use crate::materialize::NODE_KEY_FILE;
use crate::topology::{Node, NodeRole, CONFIG_FOLDER};

const STDOUT_TAG: &str = "stdout";
const STDERR_TAG: &str = "stderr";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessRole {
    Seednode,
    Node(NodeRole),
    Proxy,
}

/// One managed executable and the way it is launched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    pub label: String,
    pub role: ProcessRole,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ProcessSpec {
    pub fn seednode(config: &ConfigRoot) -> LocalnetResult<Self> {
        let folder = absolute(&config.seednode_folder())?;
        Ok(Self {
            label: "seednode".to_string(),
            role: ProcessRole::Seednode,
            program: folder.join("seednode"),
            args: vec![
                "--rest-api-interface".to_string(),
                rest_api_interface(config, config.networking.port_seednode_rest_api),
            ],
            working_dir: folder,
        })
    }

    pub fn node(config: &ConfigRoot, node: &Node) -> LocalnetResult<Self> {
        let folder = absolute(&node.folder)?;
        let mut args = vec![
            "--log-level".to_string(),
            config.general.log_level.clone(),
            "--log-save".to_string(),
            "--rest-api-interface".to_string(),
            rest_api_interface(config, node.api_port),
            "--validator-key-pem-file".to_string(),
            Path::new(CONFIG_FOLDER)
                .join(NODE_KEY_FILE)
                .display()
                .to_string(),
        ];
        if node.role == NodeRole::Observer {
            args.push("--destination-shard-as-observer".to_string());
            args.push(node.shard.to_string());
        }

        Ok(Self {
            label: node.label(),
            role: ProcessRole::Node(node.role),
            program: folder.join("node"),
            args,
            working_dir: folder,
        })
    }

    pub fn proxy(config: &ConfigRoot) -> LocalnetResult<Self> {
        let folder = absolute(&config.proxy_folder())?;
        Ok(Self {
            label: "proxy".to_string(),
            role: ProcessRole::Proxy,
            program: folder.join("proxy"),
            args: vec!["--log-level".to_string(), config.general.log_level.clone()],
            working_dir: folder,
        })
    }

    /// Fails if the executable has not been materialized.
    pub fn preflight(&self) -> LocalnetResult<()> {
        if self.program.is_file() {
            Ok(())
        } else {
            Err(LocalnetError::MissingSoftware(self.program.clone()))
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

fn rest_api_interface(config: &ConfigRoot, port: u16) -> String {
    format!("{}:{port}", config.networking.host)
}

fn absolute(path: &Path) -> LocalnetResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let current = std::env::current_dir().map_err(|err| LocalnetError::io(path, err))?;
    Ok(current.join(path))
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessExit {
    /// Cancelled before its start delay elapsed.
    NotStarted,
    /// Exited on its own while the network was running.
    Exited(ExitStatus),
    /// Killed during shutdown.
    Terminated(ExitStatus),
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProcessReport {
    pub label: String,
    pub pid: Option<u32>,
    pub exit: ProcessExit,
}

/// Drives one process through `Pending -> Starting -> Running -> Exited`.
pub(crate) async fn supervise(
    spec: ProcessSpec,
    start_delay: Duration,
    phase: Arc<LogPhase>,
    cancel: CancellationToken,
    drain_timeout: Duration,
) -> ProcessReport {
    let label = spec.label.clone();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return ProcessReport { label, pid: None, exit: ProcessExit::NotStarted };
        }
        _ = sleep(start_delay) => {}
    }

    info!(
        target = "localnet::process",
        label = %label,
        program = %spec.program.display(),
        args = ?spec.args,
        "spawning process"
    );
    let mut child = match spec.command().spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(target = "localnet::process", label = %label, "failed to spawn process: {err}");
            return ProcessReport {
                label,
                pid: None,
                exit: ProcessExit::Failed(err.to_string()),
            };
        }
    };
    let pid = child.id();
    info!(target = "localnet::process", label = %label, pid = ?pid, "process running");

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_stream_reader(stdout, label.clone(), pid, STDOUT_TAG, phase.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_stream_reader(stderr, label.clone(), pid, STDERR_TAG, phase));
    }

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                warn!(
                    target = "localnet::process",
                    label = %label,
                    pid = ?pid,
                    status = %status,
                    "process exited unexpectedly"
                );
                ProcessExit::Exited(status)
            }
            Err(err) => ProcessExit::Failed(err.to_string()),
        },
        _ = cancel.cancelled() => terminate(&mut child, &label, pid).await,
    };

    drain_readers(readers, drain_timeout, &label).await;
    ProcessReport { label, pid, exit }
}

async fn terminate(child: &mut Child, label: &str, pid: Option<u32>) -> ProcessExit {
    info!(target = "localnet::process", label, pid = ?pid, "terminating process");
    if let Err(err) = child.start_kill() {
        warn!(target = "localnet::process", label, "failed to signal termination: {err}");
    }
    match child.wait().await {
        Ok(status) => {
            info!(target = "localnet::process", label, status = %status, "process exited");
            ProcessExit::Terminated(status)
        }
        Err(err) => ProcessExit::Failed(err.to_string()),
    }
}

/// Waits for both stream readers; readers still blocked after `limit` (a
/// grandchild holding the pipe open) are aborted.
async fn drain_readers(readers: Vec<JoinHandle<()>>, limit: Duration, label: &str) {
    for mut reader in readers {
        if timeout(limit, &mut reader).await.is_err() {
            warn!(target = "localnet::process", label, "output reader did not finish; aborting");
            reader.abort();
        }
    }
}

fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    label: String,
    pid: Option<u32>,
    tag: &'static str,
    phase: Arc<LogPhase>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end();
                    if phase.observe(line) {
                        info!(
                            target = "localnet::process",
                            label = %label,
                            pid = ?pid,
                            stream = tag,
                            "{line}"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        target = "localnet::process",
                        label = %label,
                        pid = ?pid,
                        stream = tag,
                        "failed to read output: {err}"
                    );
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn observers_name_their_shard() {
        let mut config = ConfigRoot::default();
        config.metashard.num_observers = 1;
        let observer = config.observers().remove(0);
        let spec = ProcessSpec::node(&config, &observer).expect("spec");

        assert_eq!(spec.label, "observer00");
        assert_eq!(spec.role, ProcessRole::Node(NodeRole::Observer));
        assert!(spec.program.is_absolute());
        assert!(spec.program.ends_with("localnet/observer00/node"));
        let shard_flag = spec
            .args
            .iter()
            .position(|arg| arg == "--destination-shard-as-observer")
            .expect("shard flag");
        assert_eq!(spec.args[shard_flag + 1], "metachain");
        assert!(spec.args.contains(&"127.0.0.1:10100".to_string()));
    }

    #[test]
    fn validators_do_not_pin_a_shard() {
        let config = ConfigRoot::default();
        let validator = config.validators().remove(0);
        let spec = ProcessSpec::node(&config, &validator).expect("spec");
        assert!(!spec.args.iter().any(|arg| arg == "--destination-shard-as-observer"));
        assert!(spec.args.contains(&"config/validatorKey.pem".to_string()));
    }

    #[test]
    fn preflight_requires_binary() {
        let spec = ProcessSpec::proxy(&ConfigRoot::default()).expect("spec");
        assert_matches!(
            spec.preflight(),
            Err(LocalnetError::MissingSoftware(path)) if path == spec.program
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_never_spawns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let spec = ProcessSpec {
            label: "sleeper".to_string(),
            role: ProcessRole::Proxy,
            program: PathBuf::from("/bin/sleep"),
            args: vec!["30".to_string()],
            working_dir: PathBuf::from("/"),
        };
        let report = supervise(
            spec,
            Duration::from_secs(5),
            Arc::new(LogPhase::new()),
            cancel,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(report.exit, ProcessExit::NotStarted);
        assert_eq!(report.pid, None);
    }

    #[tokio::test]
    async fn output_advances_log_phase() {
        let spec = ProcessSpec {
            label: "printer".to_string(),
            role: ProcessRole::Seednode,
            program: PathBuf::from("/bin/sh"),
            args: vec![
                "-c".to_string(),
                "echo 'started committing block'; echo 'arwen: ok' >&2".to_string(),
            ],
            working_dir: PathBuf::from("/"),
        };
        let phase = Arc::new(LogPhase::new());
        let report = supervise(
            spec,
            Duration::ZERO,
            phase.clone(),
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;

        assert_matches!(report.exit, ProcessExit::Exited(status) if status.success());
        assert!(report.pid.is_some());
        assert!(phase.is_genesis_committed());
    }
}
