//! Workflow engine
//!
//! Per-instance controller composing submission, polling and the approval
//! gate. Exactly one engine exists per logical agent-and-session pairing;
//! engines never share mutable state with each other.
//!
//! Locking discipline: the instance mutex is only ever held for short,
//! non-awaiting critical sections. Every response that arrives after an
//! await (submission outcome, poll result, finalize outcome, cool-down
//! expiry) re-acquires the lock and is checked against the instance's
//! current generation before it is applied, so results from a superseded
//! run are discarded instead of clobbering newer state.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::gate;
use super::poller::{start_polling, PollHandle};
use super::state::{Checkpoint, WorkflowInstance, WorkflowState};
use crate::agent::AgentSpec;
use crate::config::OrchestrationConfig;
use crate::executor::{Executor, SubmissionOutcome, TaskSnapshot, TaskStatus};
use crate::{Error, Result};

/// Orchestrates one workflow instance against an executor
pub struct WorkflowEngine<E: Executor> {
    pub(super) inner: Arc<EngineInner<E>>,
}

pub(super) struct EngineInner<E: Executor> {
    pub(super) executor: Arc<E>,
    pub(super) spec: AgentSpec,
    pub(super) timing: OrchestrationConfig,
    pub(super) instance: Mutex<WorkflowInstance>,
    pub(super) poll: Mutex<Option<PollHandle>>,
    pub(super) state_tx: watch::Sender<WorkflowState>,
}

impl<E: Executor + 'static> WorkflowEngine<E> {
    /// Create an engine for one agent flow
    pub fn new(executor: Arc<E>, spec: AgentSpec, timing: OrchestrationConfig) -> Self {
        let instance = WorkflowInstance::new(spec.workflow);
        let (state_tx, _) = watch::channel(instance.state);
        Self {
            inner: Arc::new(EngineInner {
                executor,
                spec,
                timing,
                instance: Mutex::new(instance),
                poll: Mutex::new(None),
                state_tx,
            }),
        }
    }

    /// The agent flow this engine drives
    pub fn spec(&self) -> &AgentSpec {
        &self.inner.spec
    }

    /// Current state
    pub fn state(&self) -> WorkflowState {
        self.inner.instance.lock().unwrap().state
    }

    /// Clone of the full instance, for display
    pub fn snapshot(&self) -> WorkflowInstance {
        self.inner.instance.lock().unwrap().clone()
    }

    /// Observe state transitions without busy-polling
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.inner.state_tx.subscribe()
    }

    /// Start a new run with the given input params.
    ///
    /// Allowed from `Idle` and `Completed` only. Any poll loop left over
    /// from a previous run is cancelled before the new submission goes out,
    /// so two generations of a task can never race.
    pub async fn start(&self, params: serde_json::Value) -> Result<WorkflowState> {
        let generation = {
            let mut inst = self.inner.instance.lock().unwrap();
            if !inst.state.can_start() {
                return Err(Error::InvalidTransition {
                    state: inst.state.to_string(),
                    event: "start".into(),
                });
            }
            if let Some(handle) = self.inner.poll.lock().unwrap().take() {
                debug!(agent = %self.inner.spec.kind, "cancelling stale poll loop");
                handle.cancel();
            }
            let generation = inst.begin_run(params.clone());
            let _ = self.inner.state_tx.send(inst.state);
            generation
        };

        info!(agent = %self.inner.spec.kind, "starting workflow run");
        let outcome = self.inner.executor.submit(&self.inner.spec, &params).await;

        let mut inst = self.inner.instance.lock().unwrap();
        if inst.generation != generation {
            debug!(agent = %self.inner.spec.kind, "discarding submission outcome for superseded run");
            return Ok(inst.state);
        }

        match outcome {
            Ok(SubmissionOutcome::Accepted { task_ref }) => {
                inst.task_ref = Some(task_ref.clone());
                inst.set_state(WorkflowState::Running);
                let _ = self.inner.state_tx.send(inst.state);
                drop(inst);

                let handle = self.spawn_poll(generation, task_ref);
                *self.inner.poll.lock().unwrap() = Some(handle);
                Ok(WorkflowState::Running)
            }
            Ok(SubmissionOutcome::Checkpoint(checkpoint)) => {
                if !self.inner.spec.is_gated() {
                    inst.error = Some("executor returned a checkpoint for a direct workflow".into());
                    inst.set_state(WorkflowState::Idle);
                } else {
                    gate::open(&mut inst, checkpoint);
                }
                let _ = self.inner.state_tx.send(inst.state);
                Ok(inst.state)
            }
            Ok(SubmissionOutcome::Completed { result }) => {
                inst.result = Some(result);
                inst.set_state(WorkflowState::Completed);
                let _ = self.inner.state_tx.send(inst.state);
                Ok(WorkflowState::Completed)
            }
            Ok(SubmissionOutcome::Failed { error }) => {
                warn!(agent = %self.inner.spec.kind, %error, "submission refused");
                inst.error = Some(error);
                inst.set_state(WorkflowState::Idle);
                let _ = self.inner.state_tx.send(inst.state);
                Ok(WorkflowState::Idle)
            }
            Err(e) => {
                warn!(agent = %self.inner.spec.kind, error = %e, "submission failed");
                inst.error = Some(e.to_string());
                inst.set_state(WorkflowState::Idle);
                let _ = self.inner.state_tx.send(inst.state);
                Ok(WorkflowState::Idle)
            }
        }
    }

    fn spawn_poll(&self, generation: u64, task_ref: String) -> PollHandle {
        let inner = self.inner.clone();
        start_polling(
            self.inner.executor.clone(),
            task_ref,
            self.inner.timing.poll_interval,
            generation,
            move |snap| async move {
                EngineInner::on_poll_terminal(&inner, generation, snap);
            },
        )
    }
}

impl<E: Executor> EngineInner<E> {
    /// Apply a terminal poll observation to the instance.
    ///
    /// Runs on the poller task. Results whose generation no longer matches
    /// the instance (the run was superseded or reset) are dropped.
    pub(super) fn on_poll_terminal(inner: &Arc<Self>, generation: u64, snap: TaskSnapshot) {
        let mut inst = inner.instance.lock().unwrap();
        if inst.generation != generation || inst.state != WorkflowState::Running {
            debug!(
                agent = %inner.spec.kind,
                task_ref = %snap.task_ref,
                "discarding stale poll result"
            );
            return;
        }

        match snap.status {
            TaskStatus::Succeeded => {
                let result = snap.result.unwrap_or(serde_json::Value::Null);
                if inner.spec.is_gated() {
                    let checkpoint = inner
                        .spec
                        .artifact
                        .as_ref()
                        .and_then(|fields| Checkpoint::from_result(fields, &result));
                    match checkpoint {
                        Some(cp) => gate::open(&mut inst, cp),
                        None => {
                            // A gated task that finishes without a draft has
                            // nothing to review; surface it as a failure.
                            inst.error =
                                Some("executor result carried no reviewable draft".into());
                            inst.set_state(WorkflowState::Completed);
                        }
                    }
                } else {
                    inst.result = Some(result);
                    inst.set_state(WorkflowState::Completed);
                }
            }
            TaskStatus::Failed => {
                let error = failure_message(snap.result.as_ref());
                warn!(agent = %inner.spec.kind, %error, "task reported failure");
                inst.error = Some(error);
                inst.set_state(WorkflowState::Completed);
            }
            // The poller only delivers terminal snapshots.
            TaskStatus::Queued | TaskStatus::Running => return,
        }

        inner.poll.lock().unwrap().take();
        let _ = inner.state_tx.send(inst.state);
    }
}

/// Best human-readable message for a failed task's result payload
fn failure_message(result: Option<&serde_json::Value>) -> String {
    match result {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(value) => value
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "task failed".to_string()),
        None => "task failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::executor::testing::ScriptedExecutor;
    use crate::executor::FinalizeOutcome;
    use serde_json::json;
    use std::time::Duration;

    fn timing() -> OrchestrationConfig {
        OrchestrationConfig::default()
    }

    fn engine_for(spec: AgentSpec) -> (Arc<ScriptedExecutor>, WorkflowEngine<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::new());
        let engine = WorkflowEngine::new(executor.clone(), spec, timing());
        (executor, engine)
    }

    fn checkpoint(context: &str, draft: &str) -> Checkpoint {
        Checkpoint {
            reference_context: context.into(),
            draft_content: draft.into(),
        }
    }

    // Scenario A: gated checkpoint-first run, edit, approve, completed.
    #[tokio::test(start_paused = true)]
    async fn test_gated_checkpoint_flow_end_to_end() {
        let (executor, engine) = engine_for(AgentKind::Jeff.spec());
        executor.queue_submit(SubmissionOutcome::Checkpoint(checkpoint(
            "Acme Baby Co",
            "Hi...",
        )));
        executor.queue_finalize(FinalizeOutcome::Completed {
            result: json!("sent"),
        });

        let state = engine
            .start(json!({"niche": "Baby Care", "min_revenue": 10000}))
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::PendingApproval);

        let snap = engine.snapshot();
        assert_eq!(snap.edited_content.as_deref(), Some("Hi..."));
        assert_eq!(snap.checkpoint.unwrap().reference_context, "Acme Baby Co");

        engine.edit("Hi there...").unwrap();
        let state = engine.approve().await.unwrap();
        assert_eq!(state, WorkflowState::Completed);

        let snap = engine.snapshot();
        assert_eq!(snap.result, Some(json!("sent")));
        assert_eq!(
            executor.finalized_content.lock().unwrap().as_slice(),
            ["Hi there..."]
        );
    }

    // Scenario B: direct run, two non-terminal polls, then success.
    #[tokio::test(start_paused = true)]
    async fn test_direct_flow_polls_until_success() {
        let (executor, engine) = engine_for(AgentKind::Penny.spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-1".into(),
        });
        executor.queue_poll(TaskStatus::Queued, None);
        executor.queue_poll(TaskStatus::Running, None);
        executor.queue_poll(
            TaskStatus::Succeeded,
            Some(json!({"analysis": {"margin": "70%"}})),
        );

        let state = engine.start(json!({"product": "Wireless Earbuds"})).await.unwrap();
        assert_eq!(state, WorkflowState::Running);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(engine.state(), WorkflowState::Completed);
        assert_eq!(executor.polls_observed(), 3);
        let snap = engine.snapshot();
        assert_eq!(snap.result.unwrap()["analysis"]["margin"], "70%");
        assert!(snap.error.is_none());
    }

    // Scenario C: reject, then automatic reset after the cool-down.
    #[tokio::test(start_paused = true)]
    async fn test_reject_resets_after_cool_down() {
        let (executor, engine) = engine_for(AgentKind::Sue.spec());
        executor.queue_submit(SubmissionOutcome::Checkpoint(checkpoint(
            "refund policy",
            "Hello!",
        )));

        engine.start(json!({"ticket_text": "refund"})).await.unwrap();
        let state = engine.reject().await.unwrap();
        assert_eq!(state, WorkflowState::Rejected);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(engine.state(), WorkflowState::Idle);
        let snap = engine.snapshot();
        assert!(snap.checkpoint.is_none());
        assert!(snap.edited_content.is_none());
        assert!(snap.task_ref.is_none());
        assert!(snap.error.is_none());
        assert!(snap.input_params.is_null());
        assert_eq!(executor.cancels_observed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_returns_to_idle() {
        let (executor, engine) = engine_for(AgentKind::Adam.spec());
        executor.queue_submit(SubmissionOutcome::Failed {
            error: "campaign not found".into(),
        });

        let state = engine.start(json!({"campaign_name": "nope"})).await.unwrap();
        assert_eq!(state, WorkflowState::Idle);
        assert_eq!(
            engine.snapshot().error.as_deref(),
            Some("campaign not found")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_transport_error_returns_to_idle() {
        let (executor, engine) = engine_for(AgentKind::Jeff.spec());
        executor.queue_submit_err();

        let state = engine.start(json!({"niche": "Pets"})).await.unwrap();
        assert_eq!(state, WorkflowState::Idle);
        assert!(engine.snapshot().error.is_some());

        // the instance is restartable after the failure
        executor.queue_submit(SubmissionOutcome::Checkpoint(checkpoint("ctx", "draft")));
        let state = engine.start(json!({"niche": "Pets"})).await.unwrap();
        assert_eq!(state, WorkflowState::PendingApproval);
        assert!(engine.snapshot().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_failure_completes_with_error() {
        let (executor, engine) = engine_for(AgentKind::Lisa.spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-9".into(),
        });
        executor.queue_poll(TaskStatus::Failed, Some(json!({"error": "fetch timed out"})));

        engine.start(json!({"url": "https://example.com"})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = engine.snapshot();
        assert_eq!(snap.state, WorkflowState::Completed);
        assert!(snap.result.is_none());
        assert_eq!(snap.error.as_deref(), Some("fetch timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_read_route_completes_synchronously() {
        let (executor, engine) = engine_for(AgentKind::Ivan.legacy_spec());
        executor.queue_submit(SubmissionOutcome::Completed {
            result: json!({"stock_alerts": []}),
        });

        let state = engine.start(serde_json::Value::Null).await.unwrap();
        assert_eq!(state, WorkflowState::Completed);
        assert_eq!(executor.polls_observed(), 0);
    }

    // Sue's legacy flow: the checkpoint arrives in the poll result.
    #[tokio::test(start_paused = true)]
    async fn test_gated_checkpoint_via_poll_result() {
        let (executor, engine) = engine_for(AgentKind::Sue.legacy_spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-2".into(),
        });
        executor.queue_poll(TaskStatus::Queued, None);
        executor.queue_poll(
            TaskStatus::Succeeded,
            Some(json!({
                "policy_retrieved": "shipping damage policy",
                "draft_reply": "We are sorry to hear that...",
            })),
        );

        engine
            .start(json!({"ticket_text": "arrived broken", "order_status": "Delivered"}))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = engine.snapshot();
        assert_eq!(snap.state, WorkflowState::PendingApproval);
        assert_eq!(
            snap.edited_content.as_deref(),
            Some("We are sorry to hear that...")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_poll_success_without_draft_fails() {
        let (executor, engine) = engine_for(AgentKind::Sue.legacy_spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-3".into(),
        });
        executor.queue_poll(TaskStatus::Succeeded, Some(json!({"status": "DONE"})));

        engine.start(json!({"ticket_text": "hi"})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = engine.snapshot();
        assert_eq!(snap.state, WorkflowState::Completed);
        assert!(snap.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejected_while_running() {
        let (executor, engine) = engine_for(AgentKind::Penny.spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-4".into(),
        });

        engine.start(json!({})).await.unwrap();
        let err = engine.start(json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    // A terminal result carrying a superseded generation must not clobber
    // the live run's state.
    #[tokio::test(start_paused = true)]
    async fn test_stale_poll_result_is_discarded() {
        let (executor, engine) = engine_for(AgentKind::Penny.spec());
        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-live".into(),
        });

        engine.start(json!({"run": 1})).await.unwrap();
        assert_eq!(engine.state(), WorkflowState::Running);

        let stale = TaskSnapshot {
            task_ref: "t-stale".into(),
            status: TaskStatus::Succeeded,
            result: Some(json!({"stale": true})),
        };
        EngineInner::on_poll_terminal(&engine.inner, 0, stale);
        assert_eq!(engine.state(), WorkflowState::Running);
        assert!(engine.snapshot().result.is_none());

        let fresh = TaskSnapshot {
            task_ref: "t-live".into(),
            status: TaskStatus::Succeeded,
            result: Some(json!({"fresh": true})),
        };
        EngineInner::on_poll_terminal(&engine.inner, 1, fresh);
        assert_eq!(engine.state(), WorkflowState::Completed);
        assert_eq!(engine.snapshot().result, Some(json!({"fresh": true})));
    }

    // Starting a new run cancels any leftover poll loop before submitting,
    // so two generations of a task never poll concurrently.
    #[tokio::test(start_paused = true)]
    async fn test_new_run_cancels_leftover_poll_loop() {
        let (executor, engine) = engine_for(AgentKind::Penny.spec());

        // Plant a live loop as if left over from an earlier generation.
        let leftover = start_polling(
            executor.clone(),
            "t-old".into(),
            Duration::from_millis(2000),
            0,
            |_snap| async {},
        );
        *engine.inner.poll.lock().unwrap() = Some(leftover);

        tokio::time::sleep(Duration::from_millis(4100)).await;
        let before = executor.polls_observed();
        assert!(before >= 2);

        executor.queue_submit(SubmissionOutcome::Accepted {
            task_ref: "t-new".into(),
        });
        executor.queue_poll(TaskStatus::Succeeded, Some(json!({"ok": true})));

        engine.start(json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(engine.state(), WorkflowState::Completed);
        // Only the new task's single terminal poll fired after the cancel.
        assert_eq!(executor.polls_observed(), before + 1);
    }
}
