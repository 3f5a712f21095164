//! Execution backends, one per guest language mode.

mod oneshot;
mod persistent;
mod translating;
mod typescript;

pub use oneshot::{wrap_source, OneShotBackend};
pub use persistent::{
    PersistentRuntimeBackend, PythonWorkerSpawner, WorkerChannel, WorkerMessage, WorkerReply,
    WorkerRequest, WorkerSpawner,
};
pub use translating::TranslatingBackend;
pub use typescript::{
    translation_options, Diagnostic, ModuleLoader, NodeTypeScriptLoader, Translation,
    TranslationModule,
};
