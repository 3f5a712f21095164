use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tracing::{debug, warn};

use super::{CompletionMessage, IsolatedContext, IsolationPrimitive};
use crate::{
    config::IsolationConfig,
    error::Error,
    sandbox::{resolve_program, Sandbox},
};

const RUNNER_SCRIPT: &str = include_str!("runner.js");
const RUNNER_FILE: &str = "runner.js";

/// Isolation primitive backed by one jailed `node` process per context.
///
/// The guest script is evaluated inside an empty `vm` context of that process,
/// so it sees neither `require` nor `process`; the process itself runs under
/// the runtime's permission model with a scrubbed environment, rlimits and a
/// private working directory.
pub struct ProcessIsolate {
    config: IsolationConfig,
}

impl ProcessIsolate {
    pub fn new(config: IsolationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IsolationPrimitive for ProcessIsolate {
    async fn create_context(&self) -> Result<Box<dyn IsolatedContext>, Error> {
        let node = resolve_program(&self.config.node_command)
            .map_err(|e| Error::Context(e.to_string()))?;

        let sandbox = Sandbox::new(
            self.config.work_dir.as_deref(),
            self.config.resources.clone(),
        )
        .await
        .map_err(|e| Error::Context(e.to_string()))?;

        sandbox
            .write_file(RUNNER_FILE, RUNNER_SCRIPT)
            .await
            .map_err(|e| Error::Context(e.to_string()))?;

        Ok(Box::new(ProcessContext {
            sandbox,
            node,
            heap_limit_mb: self.config.heap_limit_mb,
            permission_flag: self.config.permission_flag.clone(),
            child: None,
        }))
    }
}

struct ProcessContext {
    sandbox: Sandbox,
    node: PathBuf,
    heap_limit_mb: u32,
    permission_flag: Option<String>,
    child: Option<Child>,
}

#[async_trait]
impl IsolatedContext for ProcessContext {
    fn id(&self) -> &str {
        self.sandbox.id()
    }

    async fn evaluate(
        &mut self,
        script: &str,
        time_limit: Duration,
    ) -> Result<CompletionMessage, Error> {
        if self.child.is_some() {
            return Err(Error::ContextRun("context already used".to_string()));
        }

        let mut command = self.sandbox.command(&self.node);
        command.arg(format!("--max-old-space-size={}", self.heap_limit_mb));
        if let Some(flag) = &self.permission_flag {
            let root = self.sandbox.root_dir();
            let root = root.canonicalize().unwrap_or(root);
            // no child process, worker or write grants
            command
                .arg(flag)
                .arg(format!("--allow-fs-read={}", root.display()));
        }
        command.arg(RUNNER_FILE);

        let child = self.child.insert(
            command
                .spawn()
                .map_err(|e| Error::ContextRun(format!("Failed to spawn process: {}", e)))?,
        );

        let job = json!({
            "script": script,
            "timeLimitMs": time_limit.as_millis() as u64,
        });
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(job.to_string().as_bytes())
                .await
                .map_err(|e| Error::ContextRun(format!("Failed to write script: {}", e)))?;
            // Explicitly close stdin to signal EOF
            drop(stdin);
        }

        let (stdout, stderr) = tokio::join!(
            read_stream(child.stdout.take()),
            read_stream(child.stderr.take())
        );
        let status = child
            .wait()
            .await
            .map_err(|e| Error::ContextRun(format!("Process error: {}", e)))?;

        if !stderr.trim().is_empty() {
            debug!(context_id = self.sandbox.id(), stderr = %stderr.trim(), "context diagnostics");
        }

        match stdout.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => Ok(serde_json::from_str(line)?),
            None => {
                warn!(context_id = self.sandbox.id(), %status, "context exited without completion message");
                Err(Error::ContextRun(format!(
                    "isolated context exited ({}) without reporting a result: {}",
                    status,
                    stderr.trim()
                )))
            }
        }
    }

    fn destroy(&mut self) {
        if let Some(mut child) = self.child.take() {
            // already exited on the normal path
            let _ = child.start_kill();
        }
        self.sandbox.destroy();
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buffer).await {
            warn!("Failed to read context stream: {}", e);
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
