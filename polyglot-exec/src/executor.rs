use async_trait::async_trait;
use std::time::Duration;

use crate::types::RawOutcome;

/// Trait for language backends driven by the dispatcher
///
/// Implementations never fail: every error is folded into the returned
/// [`RawOutcome`] at the backend boundary.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run `source` and report what happened within `time_limit`
    async fn run(&self, source: &str, stdin: Option<&str>, time_limit: Duration) -> RawOutcome;
}
