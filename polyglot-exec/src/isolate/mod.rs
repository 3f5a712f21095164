//! Isolation primitive used by the one-shot backend.
//!
//! A primitive hands out single-use contexts able to run a script with no
//! ambient access to the host. The engine only depends on the traits below, any
//! platform sandbox satisfying them is substitutable.

mod process;

pub use process::ProcessIsolate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{error::Error, types::GuestError};

/// Factory for isolated execution contexts
#[async_trait]
pub trait IsolationPrimitive: Send + Sync {
    /// Create a fresh context with no ambient privileges
    async fn create_context(&self) -> Result<Box<dyn IsolatedContext>, Error>;
}

/// Ephemeral handle to one isolated context. Never shared across calls.
#[async_trait]
pub trait IsolatedContext: Send {
    fn id(&self) -> &str;

    /// Evaluate `script` and wait for the completion message it announces.
    ///
    /// `time_limit` is advisory for the context; the caller races this future
    /// against its own timer.
    async fn evaluate(
        &mut self,
        script: &str,
        time_limit: Duration,
    ) -> Result<CompletionMessage, Error>;

    /// Tear the context down. Must be idempotent.
    fn destroy(&mut self);
}

/// Message a context announces when the wrapped script has finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub error: Option<GuestError>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Set when the context's own watchdog stopped the script
    #[serde(default)]
    pub timed_out: bool,
}

/// Owns a context and destroys it exactly once, on whichever path drops it
pub struct ContextGuard {
    context: Option<Box<dyn IsolatedContext>>,
}

impl ContextGuard {
    pub fn new(context: Box<dyn IsolatedContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    pub fn context(&mut self) -> Result<&mut (dyn IsolatedContext + 'static), Error> {
        self.context
            .as_deref_mut()
            .ok_or_else(|| Error::ContextRun("context already destroyed".to_string()))
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(mut context) = self.context.take() {
            debug!(context_id = context.id(), "destroying isolated context");
            context.destroy();
        }
    }
}
