use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::protocol::{WorkerMessage, WorkerRequest};
use crate::{
    config::RuntimeConfig,
    error::Error,
    sandbox::{resolve_program, Sandbox},
};

const BOOTSTRAP_SCRIPT: &str = include_str!("bootstrap.py");
const BOOTSTRAP_FILE: &str = "bootstrap.py";

/// Message passing endpoints of one running worker.
///
/// The inbound stream ends when the worker dies. Firing or dropping the kill
/// switch stops the worker.
pub struct WorkerChannel {
    pub outbound: mpsc::UnboundedSender<WorkerRequest>,
    pub inbound: mpsc::UnboundedReceiver<WorkerMessage>,
    pub kill_switch: Option<oneshot::Sender<()>>,
}

/// Starts interpreter workers
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<WorkerChannel, Error>;
}

/// Spawns `python3` running the embedded bootstrap script inside a jail
pub struct PythonWorkerSpawner {
    config: RuntimeConfig,
}

impl PythonWorkerSpawner {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerSpawner for PythonWorkerSpawner {
    async fn spawn(&self) -> Result<WorkerChannel, Error> {
        let python = resolve_program(&self.config.python_command)?;
        let sandbox =
            Sandbox::new(self.config.work_dir.as_deref(), self.config.resources.clone()).await?;
        sandbox.write_file(BOOTSTRAP_FILE, BOOTSTRAP_SCRIPT).await?;

        let mut command = sandbox.command(&python);
        command
            .arg("-u")
            .arg("-I")
            .arg(BOOTSTRAP_FILE)
            .args(&self.config.preload_packages);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Worker(format!("Failed to spawn {}: {}", python.display(), e)))?;
        let pid = child.id();
        info!(?pid, sandbox_id = sandbox.id(), "interpreter worker spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Worker("worker stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let (outbound, mut requests) = mpsc::unbounded_channel::<WorkerRequest>();
        let (messages, inbound) = mpsc::unbounded_channel();
        let (kill_switch, kill) = oneshot::channel::<()>();

        // requests -> worker stdin
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(request) = requests.recv().await {
                let line = match request.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("dropping unencodable request: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!("worker stdin closed: {}", e);
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // worker stdout -> messages
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match WorkerMessage::parse(&line) {
                    Some(message) => {
                        if messages.send(message).is_err() {
                            break;
                        }
                    }
                    None => debug!(line = %line, "ignoring unrecognized worker message"),
                }
            }
        });

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "polyglot_exec::worker", "{}", line);
                }
            });
        }

        // owns the child and its jail for the worker's whole life
        tokio::spawn(async move {
            let _sandbox = sandbox;
            let stop = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) => warn!(?pid, %status, "interpreter worker exited"),
                        Err(e) => warn!(?pid, "failed to wait for interpreter worker: {}", e),
                    }
                    false
                }
                _ = kill => true,
            };
            if stop {
                debug!(?pid, "stopping interpreter worker");
                if let Err(e) = child.kill().await {
                    warn!(?pid, "failed to kill interpreter worker: {}", e);
                }
            }
        });

        Ok(WorkerChannel {
            outbound,
            inbound,
            kill_switch: Some(kill_switch),
        })
    }
}
