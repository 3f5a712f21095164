//! Normalizes backend outcomes into [`ExecutionResult`].

use crate::types::{ExecutionResult, GuestError, RawOutcome};

/// First line of stderr when the translation step rejected the source
pub const TRANSLATION_ERROR_PREFIX: &str = "TypeScript compilation error:";
/// First line of stdout when translated code ran successfully
pub const TRANSLATION_SUCCESS_MARKER: &str = "✓ TypeScript compiled successfully";
const TRUNCATION_NOTICE: &str = "\n... (output truncated)";

/// Pure mapping from [`RawOutcome`] to [`ExecutionResult`]
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    max_output_size: usize,
}

impl ResultFormatter {
    pub fn new(max_output_size: usize) -> Self {
        Self { max_output_size }
    }

    pub fn format(&self, outcome: RawOutcome) -> ExecutionResult {
        let (stdout, stderr, exit_code, duration_ms) = flatten(outcome);
        ExecutionResult {
            success: exit_code == 0,
            stdout: truncate_output(stdout, self.max_output_size),
            stderr: truncate_output(stderr, self.max_output_size),
            exit_code,
            duration_ms,
        }
    }
}

fn flatten(outcome: RawOutcome) -> (String, String, i32, u64) {
    match outcome {
        RawOutcome::Script {
            output,
            error,
            duration_ms,
        } => {
            let exit_code = if error.is_some() { 1 } else { 0 };
            let stderr = error.as_ref().map(render_guest_error).unwrap_or_default();
            (output.join("\n"), stderr, exit_code, duration_ms)
        }
        RawOutcome::Process {
            stdout,
            stderr,
            exit_code,
            duration_ms,
        } => (stdout, stderr, exit_code, duration_ms),
        RawOutcome::TimedOut {
            limit_ms,
            duration_ms,
        } => (
            String::new(),
            format!("Execution timed out after {}ms", limit_ms),
            1,
            duration_ms,
        ),
        RawOutcome::TranslationFailed {
            diagnostics,
            duration_ms,
        } => {
            let mut stderr = TRANSLATION_ERROR_PREFIX.to_string();
            for line in diagnostics {
                stderr.push('\n');
                stderr.push_str(&line);
            }
            (String::new(), stderr, 1, duration_ms)
        }
        RawOutcome::Translated { notices, outcome } => {
            let (stdout, stderr, exit_code, duration_ms) = flatten(*outcome);
            let mut lines = Vec::with_capacity(notices.len() + 2);
            if exit_code == 0 {
                lines.push(TRANSLATION_SUCCESS_MARKER.to_string());
            }
            lines.extend(notices);
            if !stdout.is_empty() {
                lines.push(stdout);
            }
            (lines.join("\n"), stderr, exit_code, duration_ms)
        }
        RawOutcome::Rejected { reason } => (String::new(), reason, 1, 0),
        RawOutcome::Unavailable {
            reason,
            duration_ms,
        } => (String::new(), reason, 1, duration_ms),
    }
}

/// V8 style stacks already start with `Name: message`, anything else is spelled out
fn render_guest_error(error: &GuestError) -> String {
    let headline = format!("{}: {}", error.name, error.message);
    match &error.stack {
        Some(stack) if stack.starts_with(&headline) => stack.clone(),
        Some(stack) if !stack.trim().is_empty() => format!("{}\n{}", headline, stack),
        _ => headline,
    }
}

/// Cuts an output stream after `max` characters
pub fn truncate_output(output: String, max: usize) -> String {
    match output.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut truncated = output[..cut].to_string();
            truncated.push_str(TRUNCATION_NOTICE);
            truncated
        }
        None => output,
    }
}

impl ExecutionResult {
    /// Human readable text for display surfaces; the structured fields stay untouched
    pub fn summary(&self) -> String {
        match (self.success, self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true, _) => "Code executed successfully (no output)".to_string(),
            (true, false, _) => self.stdout.clone(),
            (false, true, true) => format!("Execution failed with exit code {}", self.exit_code),
            (false, true, false) => self.stderr.clone(),
            (false, false, true) => self.stdout.clone(),
            (false, false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}
