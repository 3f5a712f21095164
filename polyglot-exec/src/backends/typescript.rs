//! TypeScript translation module driven through `node`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time;
use tracing::{debug, info};

use crate::{
    config::TranslatorConfig,
    error::Error,
    sandbox::{resolve_program, Sandbox},
};

const TRANSPILE_SCRIPT: &str = include_str!("transpile.js");
const TRANSPILE_FILE: &str = "transpile.js";

/// Fixed compiler options applied to every translation
pub fn translation_options() -> Value {
    json!({
        "target": "ES2020",
        "module": "CommonJS",
        "strict": true,
        "esModuleInterop": true,
        "allowSyntheticDefaultImports": true,
    })
}

/// Diagnostic reported by the translator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Diagnostic {
    pub category: String,
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.category.eq_ignore_ascii_case("error")
    }

    /// `(line,col): error TS1005: ';' expected.`
    pub fn render(&self) -> String {
        let location = match (self.line, self.column) {
            (Some(line), Some(column)) => format!("({},{}): ", line, column),
            _ => String::new(),
        };
        format!(
            "{}{} TS{}: {}",
            location,
            self.category.to_ascii_lowercase(),
            self.code,
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Translation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A loaded translation module
#[async_trait]
pub trait TranslationModule: Send + Sync {
    fn version(&self) -> &str;

    async fn translate(&self, source: &str) -> Result<Translation, Error>;
}

/// Loads the translation module; called at most once per backend
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TranslationModule>, Error>;
}

/// Loads the `typescript` npm package found on `NODE_PATH`
pub struct NodeTypeScriptLoader {
    config: TranslatorConfig,
}

impl NodeTypeScriptLoader {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModuleLoader for NodeTypeScriptLoader {
    async fn load(&self) -> Result<Arc<dyn TranslationModule>, Error> {
        let node = resolve_program(&self.config.node_command)
            .map_err(|e| Error::TranslatorUnavailable(e.to_string()))?;
        let mut module = NodeTypeScriptModule {
            node,
            config: self.config.clone(),
            version: String::new(),
        };

        let probe = module.run_script(json!({ "probe": true })).await?;
        module.version = probe
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::TranslatorUnavailable("typescript did not report a version".to_string())
            })?
            .to_string();

        info!(version = %module.version, "TypeScript translator loaded");
        Ok(Arc::new(module))
    }
}

struct NodeTypeScriptModule {
    node: PathBuf,
    config: TranslatorConfig,
    version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranspileOutput {
    output_text: String,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
}

impl NodeTypeScriptModule {
    /// Run the driver script in a fresh jail and parse its single JSON line
    async fn run_script(&self, job: Value) -> Result<Value, Error> {
        let sandbox = Sandbox::new(None, self.config.resources.clone()).await?;
        sandbox.write_file(TRANSPILE_FILE, TRANSPILE_SCRIPT).await?;

        let mut command = sandbox.command(&self.node);
        command.arg(TRANSPILE_FILE);
        if let Some(node_path) = &self.config.node_path {
            command.env("NODE_PATH", node_path);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::TranslatorUnavailable(format!("Failed to spawn node: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(job.to_string().as_bytes()).await?;
            drop(stdin);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let (out, err) = tokio::try_join!(read_all(stdout), read_all(stderr))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let timeout_ms = self.config.timeout_ms;
        let (status, out, err) = time::timeout(self.config.timeout(), collect)
            .await
            .map_err(|_| Error::Translation(format!("translation timed out after {}ms", timeout_ms)))??;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err);
            return Err(Error::TranslatorUnavailable(format!(
                "translator exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&out);
        let line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| Error::Translation("translator produced no output".to_string()))?;
        Ok(serde_json::from_str(line)?)
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

#[async_trait]
impl TranslationModule for NodeTypeScriptModule {
    fn version(&self) -> &str {
        &self.version
    }

    async fn translate(&self, source: &str) -> Result<Translation, Error> {
        let value = self
            .run_script(json!({
                "source": source,
                "options": translation_options(),
            }))
            .await?;
        let output: TranspileOutput = serde_json::from_value(value)?;
        debug!(
            diagnostics = output.diagnostics.len(),
            "TypeScript source transpiled"
        );
        Ok(Translation {
            output: output.output_text,
            diagnostics: output.diagnostics,
        })
    }
}
