//! Executor boundary
//!
//! The executor is the remote backend that actually runs the agents.
//! Foreman only ever sees it through the [`Executor`] trait: submit a unit
//! of work, poll a task, finalize an approved draft, cancel a rejected one.
//! Implementations hold no workflow state; every side effect lives on the
//! executor side of the wire.

mod http;

pub use http::HttpExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::AgentSpec;
use crate::workflow::Checkpoint;
use crate::Result;

/// Execution status of a polled task. `Succeeded` and `Failed` are
/// terminal; everything else means "ask again later".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted but not yet picked up by a worker
    Queued,
    /// A worker is executing the task
    Running,
    /// Finished with a result
    Succeeded,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Whether no further status change can occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Map a Celery-style wire status onto the closed status set.
    ///
    /// Unrecognized strings are treated as non-terminal so that a backend
    /// adding intermediate states cannot wedge a workflow into a terminal
    /// state it never reached.
    pub fn from_wire(s: &str) -> TaskStatus {
        match s {
            "PENDING" | "RECEIVED" => TaskStatus::Queued,
            "STARTED" | "RETRY" => TaskStatus::Running,
            "SUCCESS" => TaskStatus::Succeeded,
            "FAILURE" | "REVOKED" => TaskStatus::Failed,
            _ => TaskStatus::Queued,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One observation of a task's state
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Opaque task identifier
    pub task_ref: String,
    pub status: TaskStatus,
    /// Agent-specific result payload, present once terminal
    pub result: Option<serde_json::Value>,
}

/// What the executor said when a run was submitted
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// Async path: the caller must poll the task to completion
    Accepted { task_ref: String },
    /// Sync gated path: the run is already waiting for human review
    Checkpoint(Checkpoint),
    /// Sync direct path (legacy read routes): the result is already final
    Completed { result: serde_json::Value },
    /// The executor refused the submission
    Failed { error: String },
}

/// What the executor said when an approved draft was finalized
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String },
}

/// Boundary to the remote agent backend
#[async_trait]
pub trait Executor: Send + Sync {
    /// Start one unit of work for `spec` with the user's input params
    async fn submit(&self, spec: &AgentSpec, params: &serde_json::Value)
        -> Result<SubmissionOutcome>;

    /// Query the current status of a previously accepted task
    async fn poll(&self, task_ref: &str) -> Result<TaskSnapshot>;

    /// Apply the approved (possibly edited) content.
    ///
    /// Must be idempotent-safe: finalizing an already-completed workflow
    /// yields [`crate::Error::Conflict`] rather than re-executing the side
    /// effect.
    async fn finalize(
        &self,
        spec: &AgentSpec,
        task_ref: Option<&str>,
        content: &str,
    ) -> Result<FinalizeOutcome>;

    /// Tell the executor a run was rejected. Best-effort: callers log and
    /// otherwise ignore failures.
    async fn cancel(&self, spec: &AgentSpec, task_ref: Option<&str>) -> Result<()>;
}
