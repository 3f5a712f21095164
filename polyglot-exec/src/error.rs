use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported language '{0}'. Supported languages: {1}")]
    UnsupportedLanguage(String, String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create isolated context: {0}")]
    Context(String),

    #[error("Isolated context failed: {0}")]
    ContextRun(String),

    #[error("Translator unavailable: {0}")]
    TranslatorUnavailable(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Runtime failed to load; reload required ({0})")]
    Bootstrap(String),

    #[error("Runtime worker error: {0}")]
    Worker(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}
