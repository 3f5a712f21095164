use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Guest languages the engine can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Native language of the isolated contexts
    JavaScript,
    /// Translated to JavaScript before execution
    TypeScript,
    /// Served by the long-lived interpreter worker
    Python,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::TypeScript, Language::Python];

    pub fn id(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
        }
    }

    /// Comma separated list of every supported identifier, used in error messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|language| language.id())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "python" | "py" => Ok(Language::Python),
            _ => Err(crate::Error::UnsupportedLanguage(
                s.to_string(),
                Self::supported_list(),
            )),
        }
    }
}

/// Code execution request
///
/// The language stays a plain string so that an unknown identifier can be
/// answered with a result instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Guest language identifier
    pub language: String,
    /// Source code to execute
    pub code: String,
    /// Wall-clock bound in milliseconds, the language default applies when absent
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    /// Input data made available to the guest
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            time_limit_ms: None,
            stdin: None,
        }
    }

    pub fn with_time_limit(mut self, time_limit_ms: u64) -> Self {
        self.time_limit_ms = Some(time_limit_ms);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Execution result, always fully populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Lifecycle of the persistent interpreter runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackendReadiness {
    NotLoaded,
    Loading,
    Ready,
    Failed { reason: String },
}

impl BackendReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, BackendReadiness::Ready)
    }
}

/// Uncaught exception reported by an isolated context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Backend specific outcome, turned into an [`ExecutionResult`] by the formatter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// An isolated context finished and reported its recorded lines
    Script {
        output: Vec<String>,
        error: Option<GuestError>,
        duration_ms: u64,
    },
    /// The interpreter worker answered with captured streams
    Process {
        stdout: String,
        stderr: String,
        exit_code: i32,
        duration_ms: u64,
    },
    /// The wall-clock bound elapsed first
    TimedOut { limit_ms: u64, duration_ms: u64 },
    /// Source was rejected by the translation step
    TranslationFailed {
        diagnostics: Vec<String>,
        duration_ms: u64,
    },
    /// Source was translated and then executed
    Translated {
        notices: Vec<String>,
        outcome: Box<RawOutcome>,
    },
    /// Terminal rejection before any backend was involved
    Rejected { reason: String },
    /// The backend could not run the code at all
    Unavailable { reason: String, duration_ms: u64 },
}
