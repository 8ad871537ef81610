//! Approval gate
//!
//! The human-in-the-loop surface of a gated workflow. A checkpoint opens
//! the gate: the draft is copied into an editable buffer and the workflow
//! suspends in `PendingApproval`. The human then edits freely, approves
//! (finalizing the possibly-edited content) or rejects (best-effort cancel
//! plus an automatic reset to `Idle` after a fixed cool-down).

use tracing::{info, warn};

use super::engine::WorkflowEngine;
use super::state::{Checkpoint, WorkflowInstance, WorkflowState};
use crate::executor::{Executor, FinalizeOutcome};
use crate::{Error, Result};

/// Open the gate on a checkpoint: seed the editable buffer from the draft
/// and suspend for review.
pub(super) fn open(inst: &mut WorkflowInstance, checkpoint: Checkpoint) {
    inst.edited_content = Some(checkpoint.draft_content.clone());
    inst.checkpoint = Some(checkpoint);
    inst.set_state(WorkflowState::PendingApproval);
}

impl<E: Executor + 'static> WorkflowEngine<E> {
    /// Replace the editable draft content. Allowed only while suspended at
    /// the gate.
    pub fn edit(&self, text: impl Into<String>) -> Result<()> {
        let mut inst = self.inner.instance.lock().unwrap();
        if inst.state != WorkflowState::PendingApproval {
            return Err(Error::InvalidTransition {
                state: inst.state.to_string(),
                event: "edit".into(),
            });
        }
        inst.edited_content = Some(text.into());
        inst.set_state(WorkflowState::PendingApproval);
        Ok(())
    }

    /// Approve the draft and finalize the run.
    ///
    /// Requires non-empty (non-whitespace) edited content. On finalize
    /// failure the workflow returns to `PendingApproval` with the edits
    /// intact so the reviewer can retry or adjust.
    pub async fn approve(&self) -> Result<WorkflowState> {
        let (generation, content, task_ref) = {
            let mut inst = self.inner.instance.lock().unwrap();
            match inst.state {
                WorkflowState::PendingApproval => {}
                WorkflowState::Completed => return Err(Error::Conflict),
                other => {
                    return Err(Error::InvalidTransition {
                        state: other.to_string(),
                        event: "approve".into(),
                    })
                }
            }
            let content = inst.edited_content.clone().unwrap_or_default();
            if content.trim().is_empty() {
                return Err(Error::EmptyDraft);
            }
            inst.set_state(WorkflowState::Applying);
            let _ = self.inner.state_tx.send(inst.state);
            (inst.generation, content, inst.task_ref.clone())
        };

        info!(agent = %self.inner.spec.kind, "applying approved draft");
        let outcome = self
            .inner
            .executor
            .finalize(&self.inner.spec, task_ref.as_deref(), &content)
            .await;

        let mut inst = self.inner.instance.lock().unwrap();
        if inst.generation != generation {
            return Ok(inst.state);
        }

        match outcome {
            Ok(FinalizeOutcome::Completed { result }) => {
                inst.result = Some(result);
                inst.error = None;
                inst.set_state(WorkflowState::Completed);
                let _ = self.inner.state_tx.send(inst.state);
                Ok(WorkflowState::Completed)
            }
            Ok(FinalizeOutcome::Failed { error }) => {
                warn!(agent = %self.inner.spec.kind, %error, "finalize refused, edits preserved");
                inst.error = Some(error);
                inst.set_state(WorkflowState::PendingApproval);
                let _ = self.inner.state_tx.send(inst.state);
                Ok(WorkflowState::PendingApproval)
            }
            Err(e) => {
                warn!(agent = %self.inner.spec.kind, error = %e, "finalize failed, edits preserved");
                inst.error = Some(e.to_string());
                inst.set_state(WorkflowState::PendingApproval);
                let _ = self.inner.state_tx.send(inst.state);
                Err(e)
            }
        }
    }

    /// Reject the draft.
    ///
    /// Moves to `Rejected` immediately, notifies the executor on a
    /// fire-and-forget basis (failure is logged, never surfaced), and
    /// schedules the automatic reset back to `Idle` after the configured
    /// cool-down.
    pub async fn reject(&self) -> Result<WorkflowState> {
        let (generation, task_ref) = {
            let mut inst = self.inner.instance.lock().unwrap();
            if inst.state != WorkflowState::PendingApproval {
                return Err(Error::InvalidTransition {
                    state: inst.state.to_string(),
                    event: "reject".into(),
                });
            }
            inst.set_state(WorkflowState::Rejected);
            let _ = self.inner.state_tx.send(inst.state);
            (inst.generation, inst.task_ref.clone())
        };

        info!(agent = %self.inner.spec.kind, "draft rejected");

        let inner = self.inner.clone();
        let cancel_ref = task_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = inner
                .executor
                .cancel(&inner.spec, cancel_ref.as_deref())
                .await
            {
                warn!(agent = %inner.spec.kind, error = %e, "reject notification failed");
            }
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.timing.reject_reset).await;
            let mut inst = inner.instance.lock().unwrap();
            if inst.generation == generation && inst.state == WorkflowState::Rejected {
                inst.reset();
                let _ = inner.state_tx.send(inst.state);
            }
        });

        Ok(WorkflowState::Rejected)
    }
}
