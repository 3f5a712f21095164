use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, warn};

use crate::{
    error::Error,
    executor::Backend,
    isolate::{CompletionMessage, ContextGuard, IsolationPrimitive},
    types::RawOutcome,
};

const HARNESS: &str = include_str!("harness.js");

/// Runs JavaScript in a fresh isolated context per call
pub struct OneShotBackend {
    isolate: Arc<dyn IsolationPrimitive>,
}

impl OneShotBackend {
    pub fn new(isolate: Arc<dyn IsolationPrimitive>) -> Self {
        Self { isolate }
    }

    async fn race(
        &self,
        guard: &mut ContextGuard,
        script: &str,
        time_limit: Duration,
    ) -> Result<Option<CompletionMessage>, Error> {
        let context = guard.context()?;
        match time::timeout(time_limit, context.evaluate(script, time_limit)).await {
            Ok(completion) => completion.map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Backend for OneShotBackend {
    fn name(&self) -> &'static str {
        "one-shot"
    }

    async fn run(&self, source: &str, stdin: Option<&str>, time_limit: Duration) -> RawOutcome {
        let limit_ms = time_limit.as_millis() as u64;

        let mut guard = match self.isolate.create_context().await {
            Ok(context) => ContextGuard::new(context),
            Err(e) => {
                warn!("isolated context unavailable: {}", e);
                return RawOutcome::Unavailable {
                    reason: e.to_string(),
                    duration_ms: 0,
                };
            }
        };

        let script = match wrap_source(source, stdin) {
            Ok(script) => script,
            Err(e) => {
                return RawOutcome::Unavailable {
                    reason: e.to_string(),
                    duration_ms: 0,
                }
            }
        };

        let started = Instant::now();
        let outcome = self.race(&mut guard, &script, time_limit).await;
        // the context is torn down before anything is reported
        drop(guard);
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Some(completion)) if completion.timed_out => {
                debug!(limit_ms, "context watchdog stopped the script");
                RawOutcome::TimedOut {
                    limit_ms,
                    duration_ms: elapsed,
                }
            }
            Ok(Some(completion)) => RawOutcome::Script {
                output: completion.output,
                error: completion.error,
                duration_ms: completion.duration_ms,
            },
            Ok(None) => {
                debug!(limit_ms, "isolated context timed out");
                RawOutcome::TimedOut {
                    limit_ms,
                    duration_ms: elapsed,
                }
            }
            Err(e) => RawOutcome::Unavailable {
                reason: e.to_string(),
                duration_ms: elapsed,
            },
        }
    }
}

/// Wrap guest source so that console output is recorded and uncaught
/// exceptions are captured. The script evaluates to a function producing the
/// completion message, called after pending microtasks have run.
pub fn wrap_source(source: &str, stdin: Option<&str>) -> Result<String, Error> {
    let source = serde_json::to_string(source)?;
    let stdin = serde_json::to_string(stdin.unwrap_or_default())?;
    Ok(format!("{}({}, {});\n", HARNESS.trim_end(), source, stdin))
}
