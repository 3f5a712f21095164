use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    backends::{
        ModuleLoader, NodeTypeScriptLoader, OneShotBackend, PersistentRuntimeBackend,
        PythonWorkerSpawner, TranslatingBackend, WorkerSpawner,
    },
    config::EngineConfig,
    error::Error,
    executor::Backend,
    formatter::ResultFormatter,
    isolate::{IsolationPrimitive, ProcessIsolate},
    types::{BackendReadiness, ExecutionRequest, ExecutionResult, Language, RawOutcome},
};

/// Routes each request to the backend serving its language.
///
/// [`ExecutionDispatcher::execute`] never fails: unknown languages, invalid
/// requests and backend failures all come back as unsuccessful results.
pub struct ExecutionDispatcher {
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
    formatter: ResultFormatter,
    javascript: Arc<OneShotBackend>,
    typescript: TranslatingBackend,
    python: PersistentRuntimeBackend,
}

/// Assembles a dispatcher, optionally with substitute isolation primitives
pub struct DispatcherBuilder {
    config: EngineConfig,
    isolate: Option<Arc<dyn IsolationPrimitive>>,
    module_loader: Option<Arc<dyn ModuleLoader>>,
    worker_spawner: Option<Arc<dyn WorkerSpawner>>,
}

impl DispatcherBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            isolate: None,
            module_loader: None,
            worker_spawner: None,
        }
    }

    pub fn isolate(mut self, isolate: Arc<dyn IsolationPrimitive>) -> Self {
        self.isolate = Some(isolate);
        self
    }

    pub fn module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = Some(loader);
        self
    }

    pub fn worker_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.worker_spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Result<ExecutionDispatcher, Error> {
        self.config.validate()?;
        let config = self.config;

        let isolate = self
            .isolate
            .unwrap_or_else(|| Arc::new(ProcessIsolate::new(config.isolation.clone())));
        let loader = self
            .module_loader
            .unwrap_or_else(|| Arc::new(NodeTypeScriptLoader::new(config.translator.clone())));
        let spawner = self
            .worker_spawner
            .unwrap_or_else(|| Arc::new(PythonWorkerSpawner::new(config.runtime.clone())));

        let javascript = Arc::new(OneShotBackend::new(isolate));
        let typescript = TranslatingBackend::new(loader, Arc::clone(&javascript));
        let python = PersistentRuntimeBackend::new(spawner, &config.runtime);

        info!(
            max_concurrent = config.max_concurrent_executions,
            "execution dispatcher ready"
        );

        Ok(ExecutionDispatcher {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_executions)),
            formatter: ResultFormatter::new(config.limits.max_output_size),
            javascript,
            typescript,
            python,
            config,
        })
    }
}

impl ExecutionDispatcher {
    /// Dispatcher with the default process-based backends
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        DispatcherBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let outcome = self.dispatch(&request).await;
        let result = self.formatter.format(outcome);
        info!(
            language = %request.language,
            success = result.success,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "execution finished"
        );
        result
    }

    async fn dispatch(&self, request: &ExecutionRequest) -> RawOutcome {
        let language = match request.language.parse::<Language>() {
            Ok(language) => language,
            Err(e) => {
                debug!(language = %request.language, "rejecting unsupported language");
                return RawOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        if let Err(e) = self.validate(request) {
            debug!(%language, "rejecting invalid request: {}", e);
            return RawOutcome::Rejected {
                reason: e.to_string(),
            };
        }

        let limit_ms = request
            .time_limit_ms
            .unwrap_or_else(|| self.config.default_time_limits.for_language(language));
        let time_limit = Duration::from_millis(limit_ms);
        let started = Instant::now();

        // waiting for a slot is charged to the request's own limit
        let _permit = match time::timeout(time_limit, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(e)) => {
                return RawOutcome::Unavailable {
                    reason: format!("Failed to acquire execution permit: {}", e),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(_) => {
                warn!(%language, limit_ms, "no execution slot freed up in time");
                return RawOutcome::TimedOut {
                    limit_ms,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        let remaining_ms = limit_ms.saturating_sub(started.elapsed().as_millis() as u64);
        if remaining_ms == 0 {
            return RawOutcome::TimedOut {
                limit_ms,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
        let remaining = Duration::from_millis(remaining_ms);
        let backend = self.backend(language);
        debug!(%language, backend = backend.name(), limit_ms, "dispatching execution");

        let outcome = backend
            .run(&request.code, request.stdin.as_deref(), remaining)
            .await;
        report_full_limit(outcome, limit_ms)
    }

    fn backend(&self, language: Language) -> &dyn Backend {
        match language {
            Language::JavaScript => self.javascript.as_ref(),
            Language::TypeScript => &self.typescript,
            Language::Python => &self.python,
        }
    }

    fn validate(&self, request: &ExecutionRequest) -> Result<(), Error> {
        let limits = &self.config.limits;

        if request.code.trim().is_empty() {
            return Err(Error::InvalidRequest("code must not be empty".to_string()));
        }
        let code_size = request.code.chars().count();
        if code_size > limits.max_code_size {
            return Err(Error::InvalidRequest(format!(
                "code is {} characters, the maximum is {}",
                code_size, limits.max_code_size
            )));
        }
        if let Some(stdin) = &request.stdin {
            let stdin_size = stdin.chars().count();
            if stdin_size > limits.max_stdin_size {
                return Err(Error::InvalidRequest(format!(
                    "stdin is {} characters, the maximum is {}",
                    stdin_size, limits.max_stdin_size
                )));
            }
        }
        if let Some(limit) = request.time_limit_ms {
            if limit < limits.min_time_limit_ms || limit > limits.max_time_limit_ms {
                return Err(Error::InvalidRequest(format!(
                    "time limit must be between {} and {} ms, got {}",
                    limits.min_time_limit_ms, limits.max_time_limit_ms, limit
                )));
            }
        }
        Ok(())
    }

    /// Free execution slots
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Lifecycle state of the persistent interpreter runtime
    pub fn runtime_readiness(&self) -> BackendReadiness {
        self.python.readiness()
    }

    /// Start bootstrapping the interpreter runtime without waiting for it
    pub fn warm_up_runtime(&self) {
        self.python.warm_up();
    }

    /// Retry a failed runtime bootstrap
    pub fn reload_runtime(&self) -> bool {
        self.python.reload()
    }

    /// Wait until the runtime bootstrap has either succeeded or failed
    pub async fn runtime_settled(&self) -> BackendReadiness {
        self.python.settled().await
    }
}

/// Timeouts report the caller's limit, not what was left after queueing
fn report_full_limit(outcome: RawOutcome, limit_ms: u64) -> RawOutcome {
    match outcome {
        RawOutcome::TimedOut { duration_ms, .. } => RawOutcome::TimedOut {
            limit_ms,
            duration_ms,
        },
        RawOutcome::Translated { notices, outcome } => RawOutcome::Translated {
            notices,
            outcome: Box::new(report_full_limit(*outcome, limit_ms)),
        },
        other => other,
    }
}
