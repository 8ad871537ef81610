//! Per-instance workflow state
//!
//! One [`WorkflowInstance`] exists per agent-and-session pairing. It is
//! created the first time a run is triggered, reused across runs, and never
//! outlives the process (no durable storage). Successive runs are told
//! apart by a generation token so that async results from a superseded run
//! can be recognized and discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::agent::{ArtifactFields, WorkflowKind};

/// Lifecycle state of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Nothing in flight; inputs are editable and a run may start
    Idle,
    /// Submitted and executing (possibly awaiting poll results)
    Running,
    /// Halted at a checkpoint, draft exposed for human review
    PendingApproval,
    /// Approval submitted, finalize call in flight
    Applying,
    /// Rejected by the human; auto-resets to Idle after a cool-down
    Rejected,
    /// Terminal: carries either a result or an executor-reported error
    Completed,
}

impl WorkflowState {
    /// States from which a new run may be started
    pub fn can_start(&self) -> bool {
        matches!(self, WorkflowState::Idle | WorkflowState::Completed)
    }

    /// Check if this state allows transitions to another state
    pub fn can_transition_to(&self, target: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, &target) {
            // From Idle
            (Idle, Running) => true,

            // From Running
            (Running, PendingApproval) => true,
            (Running, Completed) => true,
            (Running, Idle) => true, // submit failure

            // From PendingApproval
            (PendingApproval, Applying) => true,
            (PendingApproval, Rejected) => true,

            // From Applying
            (Applying, Completed) => true,
            (Applying, PendingApproval) => true, // finalize failure

            // From Rejected (cool-down elapsed)
            (Rejected, Idle) => true,

            // New run from the terminal state
            (Completed, Running) => true,

            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Running => write!(f, "running"),
            WorkflowState::PendingApproval => write!(f, "pending_approval"),
            WorkflowState::Applying => write!(f, "applying"),
            WorkflowState::Rejected => write!(f, "rejected"),
            WorkflowState::Completed => write!(f, "completed"),
        }
    }
}

/// A suspended run's reviewable artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    /// Supporting context for the reviewer (prospect info, retrieved policy)
    pub reference_context: String,
    /// The generated draft awaiting review
    pub draft_content: String,
}

impl Checkpoint {
    /// Extract a checkpoint from an executor result payload using the
    /// agent's artifact field names. Returns `None` when the payload does
    /// not carry a draft.
    pub fn from_result(fields: &ArtifactFields, value: &serde_json::Value) -> Option<Checkpoint> {
        let draft = value.get(fields.draft)?.as_str()?;
        if draft.is_empty() {
            return None;
        }
        let reference_context = match value.get(fields.context) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
            None => String::new(),
        };
        Some(Checkpoint {
            reference_context,
            draft_content: draft.to_string(),
        })
    }
}

/// Workflow instance state
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInstance {
    /// Unique instance ID (caller-scoped, not persisted)
    pub id: String,
    pub kind: WorkflowKind,
    pub state: WorkflowState,
    /// User-entered inputs for the current run; mutable only while Idle
    pub input_params: serde_json::Value,
    /// Opaque task id once an async submission is accepted
    pub task_ref: Option<String>,
    /// Present only while PendingApproval / Applying
    pub checkpoint: Option<Checkpoint>,
    /// Human-editable copy of the draft, seeded from the checkpoint
    pub edited_content: Option<String>,
    /// Final artifact, present in terminal success
    pub result: Option<serde_json::Value>,
    /// Failure description, present in terminal failure (and, transiently,
    /// after a submit failure returned the instance to Idle)
    pub error: Option<String>,
    /// Monotonic run marker; async results carrying an older generation
    /// are discarded
    #[serde(skip)]
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Create a fresh instance in `Idle`
    pub fn new(kind: WorkflowKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            state: WorkflowState::Idle,
            input_params: serde_json::Value::Null,
            task_ref: None,
            checkpoint: None,
            edited_content: None,
            result: None,
            error: None,
            generation: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Begin a new run: clear every per-run field, record the inputs, bump
    /// the generation and enter `Running`.
    pub fn begin_run(&mut self, params: serde_json::Value) -> u64 {
        self.generation += 1;
        self.task_ref = None;
        self.checkpoint = None;
        self.edited_content = None;
        self.result = None;
        self.error = None;
        self.input_params = params;
        self.started_at = Utc::now();
        self.set_state(WorkflowState::Running);
        self.generation
    }

    /// Reset to `Idle` with all fields cleared (new-run reset or the
    /// automatic cool-down after a rejection).
    pub fn reset(&mut self) {
        self.generation += 1;
        self.task_ref = None;
        self.checkpoint = None;
        self.edited_content = None;
        self.result = None;
        self.error = None;
        self.input_params = serde_json::Value::Null;
        self.set_state(WorkflowState::Idle);
    }

    /// Move to `state`, stamping `updated_at`
    pub fn set_state(&mut self, state: WorkflowState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
