//! Workflow orchestration
//!
//! The task-orchestration and human-in-the-loop state machine:
//!
//! - **State**: one [`WorkflowInstance`] per agent-and-session pairing,
//!   with a generation token telling successive runs apart
//! - **Engine**: advances the instance through its states in response to
//!   submission results, poll results and human decisions
//! - **Poller**: fixed-interval polling of accepted tasks until terminal
//! - **Gate**: suspended review of an editable draft before the
//!   irreversible side effect
//!
//! ## State machine
//!
//! ```text
//!                    start                 submit→Checkpoint / poll carries draft
//!        Idle ───────────────▶ Running ─────────────────────────▶ PendingApproval
//!         ▲                      │  │                                 │      ▲
//!         │ submit failed        │  │ poll Succeeded (direct)  approve│      │ finalize
//!         └──────────────────────┘  ▼                                 ▼      │ failed
//!                               Completed ◀────────────────────── Applying ──┘
//!         ▲
//!         │        cool-down                 reject
//!         └─────────────────── Rejected ◀───────────────────── PendingApproval
//! ```
//!
//! `Completed` doubles as the terminal failure state: it carries `error`
//! instead of `result` when the polled task itself failed. A new run may
//! start from `Idle` or `Completed` only.

pub mod engine;
pub mod gate;
pub mod poller;
pub mod state;

pub use engine::WorkflowEngine;
pub use poller::{start_polling, PollHandle};
pub use state::{Checkpoint, WorkflowInstance, WorkflowState};
