//! RPC interface to external extraction workers
//!
//! Process-backed sources talk to their worker through [`WorkerClient`]:
//! a typed request goes in, a JSON document comes out. [`CommandWorker`]
//! implements the interface by spawning a command per call; other
//! transports only need another implementation of the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::utils::error::SourceError;

/// What a worker is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Describe the formats of one content id
    Stream { id: String, quality: String },
    /// Describe the formats of several content ids in one call
    Batch { ids: Vec<String>, quality: String },
    /// Search by keyword
    Search { query: String, limit: usize },
}

impl WorkerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::Batch { .. } => "batch",
            Self::Search { .. } => "search",
        }
    }
}

/// Request/response channel to a worker
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Execute a request and return the decoded JSON reply
    async fn call(&self, request: &WorkerRequest) -> Result<Value, SourceError>;
}

/// Command-line conventions a worker program follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerDialect {
    /// yt-dlp style: `-J <url>` dumps a single JSON document
    YtDlp,
    /// Companion helper: `<command> <args...>` prints one JSON document
    Batch,
}

/// Worker that spawns a process per request
#[derive(Debug, Clone)]
pub struct CommandWorker {
    program: String,
    /// Arguments placed before the request-specific ones (e.g. a script path)
    base_args: Vec<String>,
    dialect: WorkerDialect,
    timeout: Duration,
    /// Watch-page prefix used to turn ids into URLs for yt-dlp
    watch_url: String,
}

impl CommandWorker {
    pub fn new(program: impl Into<String>, dialect: WorkerDialect, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            dialect,
            timeout,
            watch_url: "https://www.youtube.com/watch?v=".to_string(),
        }
    }

    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_watch_url(mut self, watch_url: impl Into<String>) -> Self {
        self.watch_url = watch_url.into();
        self
    }

    /// Render the argument list for a request
    pub fn args_for(&self, request: &WorkerRequest) -> Result<Vec<String>, SourceError> {
        let mut args = self.base_args.clone();

        match (self.dialect, request) {
            (WorkerDialect::YtDlp, WorkerRequest::Stream { id, .. }) => {
                args.extend(
                    ["-J", "--no-warnings", "--no-playlist"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                args.push(format!("{}{}", self.watch_url, id));
            }
            (WorkerDialect::YtDlp, WorkerRequest::Search { query, limit }) => {
                args.extend(
                    ["-J", "--no-warnings", "--flat-playlist"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                args.push(format!("ytsearch{}:{}", (*limit).max(1), query));
            }
            (WorkerDialect::YtDlp, WorkerRequest::Batch { .. }) => {
                return Err(SourceError::Unsupported("batch"));
            }
            (WorkerDialect::Batch, WorkerRequest::Stream { id, quality }) => {
                args.extend(["stream".to_string(), id.clone(), quality.clone()]);
            }
            (WorkerDialect::Batch, WorkerRequest::Batch { ids, quality }) => {
                args.extend(["batch".to_string(), ids.join(","), quality.clone()]);
            }
            (WorkerDialect::Batch, WorkerRequest::Search { query, limit }) => {
                args.extend(["search".to_string(), query.clone(), limit.to_string()]);
            }
        }

        Ok(args)
    }
}

#[async_trait]
impl WorkerClient for CommandWorker {
    async fn call(&self, request: &WorkerRequest) -> Result<Value, SourceError> {
        let args = self.args_for(request)?;
        tracing::debug!(program = %self.program, command = request.name(), "Invoking worker");

        // Dropping the future (timeout or caller cancellation) kills the child
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SourceError::Worker(format!(
                    "Failed to start {}: {}",
                    self.program, e
                )))
            }
            Err(_) => return Err(SourceError::Timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Worker(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let value: Value = serde_json::from_slice(&output.stdout)?;
        check_success_flag(value)
    }
}

/// Turn `{"success": false, "error": ...}` replies into errors
pub fn check_success_flag(value: Value) -> Result<Value, SourceError> {
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("worker reported failure")
            .to_string();
        return Err(SourceError::Worker(message));
    }
    Ok(value)
}
