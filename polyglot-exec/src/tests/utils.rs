//! In-process stand-ins for the isolation primitive, the translator and the
//! interpreter worker, so backend logic can be exercised without toolchains.

pub mod defaults {
    use crate::{EngineConfig, ResourceLimits, RuntimeConfig};
    use tokio::time::Duration;

    pub fn default_test_limits() -> ResourceLimits {
        ResourceLimits {
            cpu_time: Some(5),
            memory: None,
            file_size: 10 * 1024 * 1024, // 10MB
            open_files: 64,
        }
    }

    /// Short deadlines so failure paths settle quickly
    pub fn fast_runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            bootstrap_deadline_ms: 500,
            safety_margin_ms: 100,
            ..RuntimeConfig::default()
        }
    }

    pub fn test_engine_config() -> EngineConfig {
        EngineConfig {
            max_concurrent_executions: 4,
            ..EngineConfig::default()
        }
    }

    pub fn short_timeout() -> Duration {
        Duration::from_millis(100)
    }
}

pub mod fake_isolate {
    use crate::{CompletionMessage, Error, IsolatedContext, IsolationPrimitive};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What a fake context does with the script it is handed
    pub enum Behavior {
        Complete(CompletionMessage),
        Hang,
        Fail(String),
    }

    type Decide = dyn Fn(&str) -> Behavior + Send + Sync;

    pub fn completion(lines: &[&str]) -> CompletionMessage {
        CompletionMessage {
            output: lines.iter().map(|line| line.to_string()).collect(),
            error: None,
            duration_ms: 1,
            timed_out: false,
        }
    }

    #[derive(Clone)]
    pub struct FakeIsolate {
        decide: Arc<Decide>,
        fail_create: bool,
        pub created: Arc<AtomicUsize>,
        pub destroyed: Arc<AtomicUsize>,
        pub scripts: Arc<Mutex<Vec<String>>>,
        pub context_ids: Arc<Mutex<Vec<String>>>,
    }

    impl FakeIsolate {
        pub fn with(decide: impl Fn(&str) -> Behavior + Send + Sync + 'static) -> Self {
            Self {
                decide: Arc::new(decide),
                fail_create: false,
                created: Arc::new(AtomicUsize::new(0)),
                destroyed: Arc::new(AtomicUsize::new(0)),
                scripts: Arc::new(Mutex::new(Vec::new())),
                context_ids: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn completing(lines: &'static [&'static str]) -> Self {
            Self::with(move |_| Behavior::Complete(completion(lines)))
        }

        pub fn hanging() -> Self {
            Self::with(|_| Behavior::Hang)
        }

        pub fn unavailable() -> Self {
            Self {
                fail_create: true,
                ..Self::hanging()
            }
        }

        pub fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        pub fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }

        pub fn last_script(&self) -> Option<String> {
            self.scripts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl IsolationPrimitive for FakeIsolate {
        async fn create_context(&self) -> Result<Box<dyn IsolatedContext>, Error> {
            if self.fail_create {
                return Err(Error::Context("isolate exhausted".to_string()));
            }
            let index = self.created.fetch_add(1, Ordering::SeqCst);
            let id = format!("fake-context-{}", index);
            self.context_ids.lock().unwrap().push(id.clone());
            Ok(Box::new(FakeContext {
                id,
                isolate: self.clone(),
                destroyed: false,
            }))
        }
    }

    struct FakeContext {
        id: String,
        isolate: FakeIsolate,
        destroyed: bool,
    }

    #[async_trait]
    impl IsolatedContext for FakeContext {
        fn id(&self) -> &str {
            &self.id
        }

        async fn evaluate(
            &mut self,
            script: &str,
            _time_limit: Duration,
        ) -> Result<CompletionMessage, Error> {
            self.isolate.scripts.lock().unwrap().push(script.to_string());
            match (self.isolate.decide)(script) {
                Behavior::Complete(message) => Ok(message),
                Behavior::Hang => std::future::pending().await,
                Behavior::Fail(reason) => Err(Error::ContextRun(reason)),
            }
        }

        fn destroy(&mut self) {
            if !self.destroyed {
                self.destroyed = true;
                self.isolate.destroyed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

pub mod fake_translator {
    use crate::{Diagnostic, Error, ModuleLoader, Translation, TranslationModule};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub fn diagnostic(category: &str, code: u32, message: &str) -> Diagnostic {
        Diagnostic {
            category: category.to_string(),
            code,
            message: message.to_string(),
            line: Some(1),
            column: Some(7),
        }
    }

    #[derive(Clone)]
    pub struct FakeTranslatorLoader {
        pub loads: Arc<AtomicUsize>,
        load_delay: Duration,
        fail: bool,
        diagnostics: Vec<Diagnostic>,
    }

    impl FakeTranslatorLoader {
        pub fn new() -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                load_delay: Duration::ZERO,
                fail: false,
                diagnostics: Vec::new(),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        pub fn with_load_delay(mut self, delay: Duration) -> Self {
            self.load_delay = delay;
            self
        }

        pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
            self.diagnostics = diagnostics;
            self
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModuleLoader for FakeTranslatorLoader {
        async fn load(&self) -> Result<Arc<dyn TranslationModule>, Error> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.load_delay).await;
            if self.fail {
                return Err(Error::TranslatorUnavailable(
                    "Cannot find module 'typescript'".to_string(),
                ));
            }
            Ok(Arc::new(FakeTranslationModule {
                diagnostics: self.diagnostics.clone(),
            }))
        }
    }

    struct FakeTranslationModule {
        diagnostics: Vec<Diagnostic>,
    }

    #[async_trait]
    impl TranslationModule for FakeTranslationModule {
        fn version(&self) -> &str {
            "0.0.0-fake"
        }

        async fn translate(&self, source: &str) -> Result<Translation, Error> {
            Ok(Translation {
                output: format!("\"use strict\";\n{}", source.replace(": number", "")),
                diagnostics: self.diagnostics.clone(),
            })
        }
    }
}

pub mod fake_worker {
    use crate::{
        Error, WorkerChannel, WorkerMessage, WorkerReply, WorkerRequest, WorkerSpawner,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Clone, Copy, PartialEq, Eq)]
    pub enum Startup {
        Ready,
        NeverReady,
        ExitBeforeReady,
    }

    /// Worker speaking the line protocol from a tokio task.
    ///
    /// Sources are commands: `hang` never replies, `crash` ends the worker,
    /// `delay <ms> <text>` replies late, `raise <message>` fails like an
    /// uncaught exception, `exit <code>` exits. Anything else is echoed.
    #[derive(Clone)]
    pub struct FakeWorkerSpawner {
        startup: Startup,
        ready_after: Duration,
        failing_spawns: Arc<AtomicUsize>,
        pub spawns: Arc<AtomicUsize>,
        pub requests: Arc<Mutex<Vec<WorkerRequest>>>,
    }

    impl FakeWorkerSpawner {
        pub fn new() -> Self {
            Self {
                startup: Startup::Ready,
                ready_after: Duration::ZERO,
                failing_spawns: Arc::new(AtomicUsize::new(0)),
                spawns: Arc::new(AtomicUsize::new(0)),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn startup(mut self, startup: Startup) -> Self {
            self.startup = startup;
            self
        }

        pub fn ready_after(mut self, delay: Duration) -> Self {
            self.ready_after = delay;
            self
        }

        /// The first `count` spawn attempts fail
        pub fn failing_first(self, count: usize) -> Self {
            self.failing_spawns.store(count, Ordering::SeqCst);
            self
        }

        pub fn spawns(&self) -> usize {
            self.spawns.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<WorkerRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn reply(request: &WorkerRequest, stdout: &str, stderr: &str, exit_code: i32) -> WorkerMessage {
        WorkerMessage::Reply(WorkerReply {
            correlation_id: request.correlation_id,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        })
    }

    #[async_trait]
    impl WorkerSpawner for FakeWorkerSpawner {
        async fn spawn(&self) -> Result<WorkerChannel, Error> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing_spawns
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(Error::Worker("No module named 'encodings'".to_string()));
            }

            let (outbound, mut requests) = mpsc::unbounded_channel::<WorkerRequest>();
            let (messages, inbound) = mpsc::unbounded_channel();
            let (kill_switch, mut kill) = oneshot::channel::<()>();
            let startup = self.startup;
            let ready_after = self.ready_after;
            let seen = Arc::clone(&self.requests);

            tokio::spawn(async move {
                match startup {
                    Startup::ExitBeforeReady => return,
                    Startup::NeverReady => {
                        let _ = kill.await;
                        drop(messages);
                        return;
                    }
                    Startup::Ready => {}
                }
                tokio::time::sleep(ready_after).await;
                if messages.send(WorkerMessage::Ready).is_err() {
                    return;
                }

                loop {
                    let request = tokio::select! {
                        _ = &mut kill => break,
                        request = requests.recv() => match request {
                            Some(request) => request,
                            None => break,
                        },
                    };
                    seen.lock().unwrap().push(request.clone());

                    let source = request.source_text.clone();
                    let mut words = source.splitn(3, ' ');
                    match words.next().unwrap_or_default() {
                        "hang" => {}
                        "crash" => break,
                        "delay" => {
                            let ms: u64 = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
                            let text = words.next().unwrap_or_default().to_string();
                            let messages = messages.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                                let _ = messages.send(reply(&request, &text, "", 0));
                            });
                        }
                        "raise" => {
                            let message = source.trim_start_matches("raise ").to_string();
                            let stderr = format!(
                                "Traceback (most recent call last):\n  File \"<main>\", line 1, in <module>\nValueError: {}\n",
                                message
                            );
                            let _ = messages.send(reply(&request, "", &stderr, 1));
                        }
                        "exit" => {
                            let code = words.next().and_then(|w| w.parse().ok()).unwrap_or(1);
                            let _ = messages.send(reply(&request, "", "", code));
                        }
                        _ => {
                            let stdout = format!("{}\n", source);
                            let _ = messages.send(reply(&request, &stdout, "", 0));
                        }
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
}
