use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{
    oneshot::OneShotBackend,
    typescript::{Diagnostic, ModuleLoader, TranslationModule},
};
use crate::{executor::Backend, types::RawOutcome};

/// Translates TypeScript to JavaScript and hands the result to the one-shot backend.
///
/// The translation module is loaded lazily, at most once; concurrent callers
/// during the load all await the same in-flight attempt, and a failed load is
/// remembered rather than retried.
pub struct TranslatingBackend {
    loader: Arc<dyn ModuleLoader>,
    module: OnceCell<Result<Arc<dyn TranslationModule>, String>>,
    oneshot: Arc<OneShotBackend>,
}

impl TranslatingBackend {
    pub fn new(loader: Arc<dyn ModuleLoader>, oneshot: Arc<OneShotBackend>) -> Self {
        Self {
            loader,
            module: OnceCell::new(),
            oneshot,
        }
    }

    async fn module(&self) -> Result<Arc<dyn TranslationModule>, String> {
        self.module
            .get_or_init(|| async {
                info!("loading translation module");
                match self.loader.load().await {
                    Ok(module) => Ok(module),
                    Err(e) => {
                        warn!("translation module failed to load: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await
            .clone()
    }

    /// Whether the translation module has been loaded successfully
    pub fn is_loaded(&self) -> bool {
        matches!(self.module.get(), Some(Ok(_)))
    }
}

#[async_trait]
impl Backend for TranslatingBackend {
    fn name(&self) -> &'static str {
        "translating"
    }

    async fn run(&self, source: &str, stdin: Option<&str>, time_limit: Duration) -> RawOutcome {
        let started = Instant::now();

        let module = match self.module().await {
            Ok(module) => module,
            Err(reason) => {
                return RawOutcome::Unavailable {
                    reason,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        let translation = match module.translate(source).await {
            Ok(translation) => translation,
            Err(e) => {
                return RawOutcome::Unavailable {
                    reason: e.to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        if translation.has_errors() {
            return RawOutcome::TranslationFailed {
                diagnostics: translation
                    .diagnostics
                    .iter()
                    .filter(|diagnostic| diagnostic.is_error())
                    .map(Diagnostic::render)
                    .collect(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        let notices = translation.diagnostics.iter().map(Diagnostic::render).collect();
        let outcome = self
            .oneshot
            .run(&translation.output, stdin, time_limit)
            .await;

        RawOutcome::Translated {
            notices,
            outcome: Box::new(outcome),
        }
    }
}
