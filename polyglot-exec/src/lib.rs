//! # Polyglot Execution Engine
//!
//! Runs untrusted guest programs written in JavaScript, TypeScript or Python
//! and reports a uniform [`ExecutionResult`] for each of them.
//!
//! Every language is served by its own backend:
//! - JavaScript runs in a fresh isolated context per call.
//! - TypeScript is translated to JavaScript first, by a translator loaded once.
//! - Python runs on a long-lived interpreter worker, multiplexed by correlation id.

mod backends;
mod catalog;
mod config;
mod dispatcher;
mod error;
mod executor;
mod formatter;
mod isolate;
mod sandbox;
mod types;

pub use backends::{
    translation_options, wrap_source, Diagnostic, ModuleLoader, NodeTypeScriptLoader, OneShotBackend,
    PersistentRuntimeBackend, PythonWorkerSpawner, TranslatingBackend, Translation,
    TranslationModule, WorkerChannel, WorkerMessage, WorkerReply, WorkerRequest, WorkerSpawner,
};
pub use catalog::{catalog, template, ExecutionMode, LanguageInfo};
pub use config::{
    DefaultTimeLimits, EngineConfig, IsolationConfig, RequestLimits, ResourceLimits,
    RuntimeConfig, TranslatorConfig,
};
pub use dispatcher::{DispatcherBuilder, ExecutionDispatcher};
pub use error::Error;
pub use executor::Backend;
pub use formatter::{
    truncate_output, ResultFormatter, TRANSLATION_ERROR_PREFIX, TRANSLATION_SUCCESS_MARKER,
};
pub use isolate::{
    CompletionMessage, ContextGuard, IsolatedContext, IsolationPrimitive, ProcessIsolate,
};
pub use sandbox::Sandbox;
pub use types::{
    BackendReadiness, ExecutionRequest, ExecutionResult, GuestError, Language, RawOutcome,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
