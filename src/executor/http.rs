//! HTTP executor
//!
//! reqwest-backed implementation of [`Executor`] against the agent
//! backend's REST surface. Pure boundary code: it translates wire shapes
//! into the orchestration vocabulary and keeps no state of its own beyond
//! the connection pool.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{Executor, FinalizeOutcome, SubmissionOutcome, TaskSnapshot, TaskStatus};
use crate::agent::{AgentSpec, StartRoute};
use crate::config::ExecutorConfig;
use crate::workflow::Checkpoint;
use crate::{Error, Result};

/// Executor client for the HTTP agent backend
pub struct HttpExecutor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Build a client from configuration
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Start response: either `{task_id}` (accepted) or a checkpoint object
/// whose agent-specific fields land in `extra`.
#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    task_id: String,
    status: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Best human-readable message for a non-success response
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message {
            return message;
        }
        match parsed.detail {
            Some(serde_json::Value::String(s)) => return s,
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    format!("executor returned HTTP {status}")
}

/// Fill `{param}` segments in a read-route path from the input params
fn fill_path(template: &str, params: &serde_json::Value) -> Result<String> {
    let mut path = template.to_string();
    while let Some(open) = path.find('{') {
        let close = path[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| Error::Config(format!("unbalanced path template: {template}")))?;
        let key = path[open + 1..close].to_string();
        let value = match params.get(&key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => {
                return Err(Error::Executor(format!("missing path param `{key}`")))
            }
            Some(other) => other.to_string(),
        };
        path.replace_range(open..=close, &value);
    }
    Ok(path)
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn submit(
        &self,
        spec: &AgentSpec,
        params: &serde_json::Value,
    ) -> Result<SubmissionOutcome> {
        match &spec.route {
            StartRoute::Read(template) => {
                let path = fill_path(template, params)?;
                debug!(agent = %spec.kind, %path, "reading synchronous result");
                let resp = self.client.get(self.url(&path)).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Ok(SubmissionOutcome::Failed {
                        error: error_message(status, &body),
                    });
                }
                let result: serde_json::Value = resp.json().await?;
                Ok(SubmissionOutcome::Completed { result })
            }
            StartRoute::Workflow(path) | StartRoute::Task(path) => {
                debug!(agent = %spec.kind, %path, "submitting run");
                let resp = self.client.post(self.url(path)).json(params).send().await?;
                let status = resp.status();
                let body = resp.text().await?;
                if !status.is_success() {
                    return Ok(SubmissionOutcome::Failed {
                        error: error_message(status, &body),
                    });
                }

                let parsed: StartResponse = serde_json::from_str(&body)?;
                if let Some(task_ref) = parsed.task_id {
                    debug!(agent = %spec.kind, %task_ref, "submission accepted");
                    return Ok(SubmissionOutcome::Accepted { task_ref });
                }
                if let Some(fields) = &spec.artifact {
                    let value = serde_json::Value::Object(parsed.extra);
                    if let Some(checkpoint) = Checkpoint::from_result(fields, &value) {
                        debug!(agent = %spec.kind, "submission paused at checkpoint");
                        return Ok(SubmissionOutcome::Checkpoint(checkpoint));
                    }
                }
                Ok(SubmissionOutcome::Failed {
                    error: parsed
                        .message
                        .unwrap_or_else(|| "executor returned neither task id nor checkpoint".into()),
                })
            }
        }
    }

    async fn poll(&self, task_ref: &str) -> Result<TaskSnapshot> {
        let resp = self
            .client
            .get(self.url(&format!("/tasks/{task_ref}")))
            .send()
            .await?
            .error_for_status()?;
        let parsed: TaskResponse = resp.json().await?;
        Ok(TaskSnapshot {
            task_ref: parsed.task_id,
            status: TaskStatus::from_wire(&parsed.status),
            result: parsed.result,
        })
    }

    async fn finalize(
        &self,
        spec: &AgentSpec,
        _task_ref: Option<&str>,
        content: &str,
    ) -> Result<FinalizeOutcome> {
        let fields = spec.artifact.as_ref().ok_or_else(|| {
            Error::Executor(format!("{} workflow has no approval step", spec.kind))
        })?;

        let mut body = serde_json::Map::new();
        body.insert(fields.edited.to_string(), content.into());

        let resp = self
            .client
            .post(self.url(&spec.approve_path()))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return Err(Error::Conflict);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Ok(FinalizeOutcome::Failed {
                error: error_message(status, &text),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let result = value.get(fields.finalized).cloned().unwrap_or(value);
        Ok(FinalizeOutcome::Completed { result })
    }

    async fn cancel(&self, spec: &AgentSpec, _task_ref: Option<&str>) -> Result<()> {
        self.client
            .post(self.url(&spec.reject_path()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
