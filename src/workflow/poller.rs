//! Status polling
//!
//! Drives an accepted task to a terminal status by querying the executor at
//! a fixed interval. No backoff: these are short-lived, human-scale
//! operations. A transport failure while polling counts as a non-terminal
//! observation and is retried on the next tick; only an observed terminal
//! status (or cancellation) stops the loop.
//!
//! Cancellation is immediate for scheduling purposes: no further polls are
//! issued after `cancel()`. A request already in flight is allowed to
//! finish, and its result is discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::executor::{Executor, TaskSnapshot};

/// Handle to one running poll loop
pub struct PollHandle {
    generation: u64,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// The run generation this loop was started for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop scheduling further polls. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Whether the loop has exited (terminal status delivered or cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Start polling `task_ref` every `interval` until a terminal status is
/// observed, then invoke `on_terminal` exactly once with the final
/// snapshot. The first poll fires immediately.
pub fn start_polling<E, F, Fut>(
    executor: Arc<E>,
    task_ref: String,
    interval: Duration,
    generation: u64,
    on_terminal: F,
) -> PollHandle
where
    E: Executor + 'static,
    F: FnOnce(TaskSnapshot) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    debug!(%task_ref, "poll loop cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }
            if *cancel_rx.borrow() {
                debug!(%task_ref, "poll loop cancelled");
                return;
            }

            let observed = executor.poll(&task_ref).await;

            // The handle may have been cancelled while the request was in
            // flight; the result of a cancelled generation must not leak.
            if *cancel_rx.borrow() {
                debug!(%task_ref, "discarding poll result after cancellation");
                return;
            }

            match observed {
                Ok(snap) if snap.status.is_terminal() => {
                    debug!(%task_ref, status = %snap.status, "task reached terminal status");
                    on_terminal(snap).await;
                    return;
                }
                Ok(snap) => {
                    debug!(%task_ref, status = %snap.status, "task not terminal yet");
                }
                Err(e) => {
                    debug!(%task_ref, error = %e, "poll transport error, retrying next tick");
                }
            }
        }
    });

    PollHandle {
        generation,
        cancel: cancel_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ScriptedExecutor;
    use crate::executor::TaskStatus;
    use serde_json::json;
    use tokio::sync::Mutex;

    fn capture_slot() -> (
        Arc<Mutex<Vec<TaskSnapshot>>>,
        impl FnOnce(TaskSnapshot) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static,
    ) {
        let slot: Arc<Mutex<Vec<TaskSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = slot.clone();
        let callback = move |snap: TaskSnapshot| {
            Box::pin(async move {
                sink.lock().await.push(snap);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (slot, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_terminal_status() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.queue_poll(TaskStatus::Queued, None);
        executor.queue_poll(TaskStatus::Queued, None);
        executor.queue_poll(TaskStatus::Succeeded, Some(json!({"leads": []})));

        let (slot, callback) = capture_slot();
        let handle = start_polling(
            executor.clone(),
            "t-1".into(),
            Duration::from_millis(2000),
            1,
            callback,
        );

        tokio::time::sleep(Duration::from_secs(30)).await;

        let delivered = slot.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].status, TaskStatus::Succeeded);
        // two non-terminal observations, then the terminal one
        assert_eq!(executor.polls_observed(), 3);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scheduling() {
        let executor = Arc::new(ScriptedExecutor::new());
        // script exhausts immediately; executor reports Queued forever

        let (slot, callback) = capture_slot();
        let handle = start_polling(
            executor.clone(),
            "t-2".into(),
            Duration::from_millis(2000),
            1,
            callback,
        );

        tokio::time::sleep(Duration::from_millis(5000)).await;
        let before = executor.polls_observed();
        assert!(before >= 1);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(executor.polls_observed(), before);
        assert!(slot.lock().await.is_empty());
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.queue_poll_err();
        executor.queue_poll_err();
        executor.queue_poll(TaskStatus::Succeeded, None);

        let (slot, callback) = capture_slot();
        let _handle = start_polling(
            executor.clone(),
            "t-3".into(),
            Duration::from_millis(2000),
            1,
            callback,
        );

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(executor.polls_observed(), 3);
        assert_eq!(slot.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let executor = Arc::new(ScriptedExecutor::new());

        let (_slot, callback) = capture_slot();
        let handle = start_polling(
            executor.clone(),
            "t-4".into(),
            Duration::from_millis(2000),
            1,
            callback,
        );
        drop(handle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        // first immediate poll may or may not have fired before the drop
        assert!(executor.polls_observed() <= 1);
    }
}
