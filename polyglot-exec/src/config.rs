use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{error::Error, types::Language};

/// Resource limits applied to every sandboxed child process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum CPU time (seconds), unlimited when absent
    pub cpu_time: Option<u32>,
    /// Maximum address space (bytes), unlimited when absent
    pub memory: Option<u64>,
    /// Maximum size of a written file (bytes)
    pub file_size: u64,
    /// Maximum number of open file descriptors
    pub open_files: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: Some(10),
            memory: None,
            file_size: 1024 * 1024, // 1MB
            open_files: 64,
        }
    }
}

/// Bounds checked before a request reaches a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    pub max_code_size: usize,
    pub max_stdin_size: usize,
    pub min_time_limit_ms: u64,
    pub max_time_limit_ms: u64,
    /// Characters kept per output stream before truncation
    pub max_output_size: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_code_size: 50_000,
            max_stdin_size: 10_000,
            min_time_limit_ms: 100,
            max_time_limit_ms: 30_000,
            max_output_size: 10_000,
        }
    }
}

/// Time limits used when a request does not carry one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultTimeLimits {
    pub javascript_ms: u64,
    pub typescript_ms: u64,
    pub python_ms: u64,
}

impl Default for DefaultTimeLimits {
    fn default() -> Self {
        Self {
            javascript_ms: 5_000,
            typescript_ms: 5_000,
            // absorbs the interpreter cold start
            python_ms: 30_000,
        }
    }
}

impl DefaultTimeLimits {
    pub fn for_language(&self, language: Language) -> u64 {
        match language {
            Language::JavaScript => self.javascript_ms,
            Language::TypeScript => self.typescript_ms,
            Language::Python => self.python_ms,
        }
    }
}

/// Settings of the process isolate backing one-shot contexts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// JavaScript runtime executable
    pub node_command: String,
    /// Parent directory for per-context jails, the system temp dir when absent
    pub work_dir: Option<PathBuf>,
    /// V8 old-space limit handed to the runtime (megabytes)
    pub heap_limit_mb: u32,
    /// Flag enabling the runtime's permission model; reads stay confined to
    /// the jail and child processes, workers and file writes are refused.
    /// `None` runs without it, for runtimes that predate the flag.
    pub permission_flag: Option<String>,
    pub resources: ResourceLimits,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            work_dir: None,
            heap_limit_mb: 128,
            permission_flag: Some("--experimental-permission".to_string()),
            resources: ResourceLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub node_command: String,
    /// Module search path containing the `typescript` package
    pub node_path: Option<String>,
    pub timeout_ms: u64,
    pub resources: ResourceLimits,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            node_path: std::env::var("NODE_PATH").ok(),
            timeout_ms: 10_000,
            resources: ResourceLimits::default(),
        }
    }
}

impl TranslatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub python_command: String,
    /// Deadline for the one-time interpreter bootstrap
    pub bootstrap_deadline_ms: u64,
    /// Added to each execution's limit to cover message passing latency
    pub safety_margin_ms: u64,
    pub preload_packages: Vec<String>,
    pub work_dir: Option<PathBuf>,
    pub resources: ResourceLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python_command: "python3".to_string(),
            bootstrap_deadline_ms: 60_000,
            safety_margin_ms: 2_000,
            preload_packages: [
                "math",
                "json",
                "re",
                "random",
                "itertools",
                "functools",
                "collections",
                "datetime",
                "statistics",
                "string",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            work_dir: None,
            // the worker lives for the whole process, cumulative CPU must not kill it
            resources: ResourceLimits {
                cpu_time: None,
                ..ResourceLimits::default()
            },
        }
    }
}

impl RuntimeConfig {
    pub fn bootstrap_deadline(&self) -> Duration {
        Duration::from_millis(self.bootstrap_deadline_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }
}

/// Engine wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_executions: usize,
    pub limits: RequestLimits,
    pub default_time_limits: DefaultTimeLimits,
    pub isolation: IsolationConfig,
    pub translator: TranslatorConfig,
    pub runtime: RuntimeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            limits: RequestLimits::default(),
            default_time_limits: DefaultTimeLimits::default(),
            isolation: IsolationConfig::default(),
            translator: TranslatorConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_executions == 0 {
            return Err(Error::Config(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }

        let limits = &self.limits;
        if limits.min_time_limit_ms == 0 || limits.min_time_limit_ms > limits.max_time_limit_ms {
            return Err(Error::Config(format!(
                "time limit bounds [{}, {}] are invalid",
                limits.min_time_limit_ms, limits.max_time_limit_ms
            )));
        }

        for language in Language::ALL {
            let default = self.default_time_limits.for_language(language);
            if default < limits.min_time_limit_ms || default > limits.max_time_limit_ms {
                return Err(Error::Config(format!(
                    "default time limit for {} ({}ms) is outside [{}, {}]",
                    language, default, limits.min_time_limit_ms, limits.max_time_limit_ms
                )));
            }
        }

        if self.runtime.bootstrap_deadline_ms <= limits.max_time_limit_ms {
            return Err(Error::Config(format!(
                "bootstrap deadline ({}ms) must exceed the largest execution limit ({}ms)",
                self.runtime.bootstrap_deadline_ms, limits.max_time_limit_ms
            )));
        }

        Ok(())
    }
}
