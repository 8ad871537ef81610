//! Foreman: human-in-the-loop orchestration for remote agent workflows
//!
//! Coordinates long-running agent operations (lead outreach, pricing
//! analysis, ad optimization, support replies, restocking, SEO audits)
//! executed by a remote backend. Foreman owns the orchestration envelope,
//! not the agents themselves:
//!
//! - **Submission**: start a unit of work against the executor and receive
//!   either an opaque task id (fire-and-poll) or an immediate review
//!   checkpoint.
//! - **Polling**: drive fire-and-poll tasks at a fixed interval until they
//!   reach a terminal status.
//! - **Approval**: gated workflows halt with an editable draft; a human
//!   approves (possibly after editing) or rejects before the irreversible
//!   side effect (send, publish) happens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         WorkflowEngine (per agent)      │
//! │  Idle → Running → PendingApproval → …   │
//! └───────┬───────────────┬─────────────────┘
//!         ▼               ▼
//! ┌───────────────┐ ┌─────────────────────┐
//! │ StatusPoller  │ │   Approval gate     │
//! │ fixed 2s loop │ │ approve/edit/reject │
//! └───────┬───────┘ └─────────┬───────────┘
//!         ▼                   ▼
//! ┌─────────────────────────────────────────┐
//! │      Executor (HTTP backend boundary)   │
//! └─────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod executor;
pub mod workflow;

// Re-exports for convenience
pub use agent::{AgentKind, AgentSpec, WorkflowKind};
pub use config::Config;
pub use executor::{Executor, FinalizeOutcome, HttpExecutor, SubmissionOutcome, TaskStatus};
pub use workflow::{Checkpoint, WorkflowEngine, WorkflowInstance, WorkflowState};

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Invalid transition: {event} not allowed in {state}")]
    InvalidTransition { state: String, event: String },

    #[error("Draft content is empty")]
    EmptyDraft,

    #[error("Workflow already finalized")]
    Conflict,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
