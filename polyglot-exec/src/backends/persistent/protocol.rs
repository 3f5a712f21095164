//! Line-delimited JSON spoken with the interpreter worker.
//!
//! Worker to orchestrator: `{"type":"ready"}` once at startup, then one reply
//! per request. Orchestrator to worker: one request per line.

use serde::{Deserialize, Serialize};

/// Request sent to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub correlation_id: u64,
    pub source_text: String,
    pub time_limit_ms: u64,
}

/// Reply carrying the captured streams of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReply {
    pub correlation_id: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_code: i32,
}

/// Anything the worker may announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Ready,
    Reply(WorkerReply),
}

#[derive(Deserialize)]
struct Announcement {
    #[serde(rename = "type")]
    kind: String,
}

impl WorkerMessage {
    /// Parse one line from the worker. Unrecognized lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Ok(reply) = serde_json::from_str::<WorkerReply>(line) {
            return Some(WorkerMessage::Reply(reply));
        }
        match serde_json::from_str::<Announcement>(line) {
            Ok(announcement) if announcement.kind == "ready" => Some(WorkerMessage::Ready),
            _ => None,
        }
    }
}

impl WorkerRequest {
    /// Encode as a single newline-terminated line
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
