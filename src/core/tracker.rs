//! Counting of in-flight tracked operations.
//!
//! A [`TaskTracker`] announces every operation it starts to an [`ActivitySink`]
//! and hands back an [`ActivityGuard`] whose drop announces completion. Because the
//! guard owns the decrement, it happens exactly once whether the operation
//! succeeds, fails, panics or is cancelled.
use crate::core::error::Operation;
use futures::future::{BoxFuture, join_all};
use std::sync::Arc;
use tracing::debug;

/// Receives start/finish notifications for tracked operations.
pub trait ActivitySink: Send + Sync + 'static {
    fn started(&self, operation: Operation);
    fn finished(&self, operation: Operation);
}

/// An operation to run under tracking.
pub struct TrackedOp {
    pub operation: Operation,
    pub future: BoxFuture<'static, anyhow::Result<()>>,
}

impl TrackedOp {
    pub fn new<F>(operation: Operation, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            operation,
            future: Box::pin(future),
        }
    }
}

#[must_use = "dropping the guard marks the operation finished"]
pub struct ActivityGuard {
    sink: Arc<dyn ActivitySink>,
    operation: Operation,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.sink.finished(self.operation);
    }
}

#[derive(Clone)]
pub struct TaskTracker {
    sink: Arc<dyn ActivitySink>,
}

impl TaskTracker {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    /// Marks `operation` as started. It is finished when the guard is dropped.
    pub fn begin(&self, operation: Operation) -> ActivityGuard {
        self.sink.started(operation);
        ActivityGuard {
            sink: Arc::clone(&self.sink),
            operation,
        }
    }

    /// Runs `ops` concurrently and waits for every one of them.
    ///
    /// All operations are counted as started before any is polled. A failing
    /// operation never cancels its siblings; every error is returned once all
    /// operations have settled.
    pub async fn run_all(&self, ops: Vec<TrackedOp>) -> Vec<(Operation, anyhow::Error)> {
        let guarded: Vec<_> = ops
            .into_iter()
            .map(|op| {
                let guard = self.begin(op.operation);
                async move {
                    let result = op.future.await;
                    drop(guard);
                    debug!(
                        operation = %op.operation,
                        ok = result.is_ok(),
                        "Tracked operation settled"
                    );
                    result.err().map(|e| (op.operation, e))
                }
            })
            .collect();

        join_all(guarded).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CountingSink {
        active: AtomicI64,
        went_negative: AtomicBool,
        log: Mutex<Vec<(Operation, bool)>>,
    }

    impl ActivitySink for CountingSink {
        fn started(&self, operation: Operation) {
            self.active.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push((operation, true));
        }

        fn finished(&self, operation: Operation) {
            if self.active.fetch_sub(1, Ordering::SeqCst) <= 0 {
                self.went_negative.store(true, Ordering::SeqCst);
            }
            self.log.lock().unwrap().push((operation, false));
        }
    }

    #[tokio::test]
    async fn test_all_errors_collected_and_count_restored() {
        let sink = Arc::new(CountingSink::default());
        let tracker = TaskTracker::new(sink.clone());

        let errors = tracker
            .run_all(vec![
                TrackedOp::new(Operation::RefreshPrices, async { Err(anyhow!("prices down")) }),
                TrackedOp::new(Operation::RefreshAllowanceAndMetrics, async {
                    Err(anyhow!("renter down"))
                }),
            ])
            .await;

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, Operation::RefreshPrices);
        assert_eq!(errors[1].0, Operation::RefreshAllowanceAndMetrics);
        assert_eq!(sink.active.load(Ordering::SeqCst), 0);
        assert!(!sink.went_negative.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_sibling() {
        let sink = Arc::new(CountingSink::default());
        let tracker = TaskTracker::new(sink.clone());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let sibling_finished = Arc::new(AtomicBool::new(false));
        let flag = sibling_finished.clone();

        let run = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                tracker
                    .run_all(vec![
                        TrackedOp::new(Operation::RefreshPrices, async { Err(anyhow!("boom")) }),
                        TrackedOp::new(Operation::RefreshAllowanceAndMetrics, async move {
                            release_rx.await?;
                            flag.store(true, Ordering::SeqCst);
                            Ok(())
                        }),
                    ])
                    .await
            }
        });

        // The failing op settles first while its sibling stays in flight.
        while sink.active.load(Ordering::SeqCst) != 1 {
            tokio::task::yield_now().await;
        }
        release_tx.send(()).unwrap();

        let errors = run.await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(sibling_finished.load(Ordering::SeqCst));
        assert_eq!(sink.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_guard_released_on_cancellation() {
        let sink = Arc::new(CountingSink::default());
        let tracker = TaskTracker::new(sink.clone());

        let run = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                tracker
                    .run_all(vec![TrackedOp::new(
                        Operation::ApplyAllowance,
                        futures::future::pending(),
                    )])
                    .await
            }
        });
        while sink.active.load(Ordering::SeqCst) != 1 {
            tokio::task::yield_now().await;
        }

        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());
        assert_eq!(sink.active.load(Ordering::SeqCst), 0);
        assert_eq!(
            *sink.log.lock().unwrap(),
            vec![
                (Operation::ApplyAllowance, true),
                (Operation::ApplyAllowance, false)
            ]
        );
    }

    #[tokio::test]
    async fn test_all_started_before_any_finishes() {
        let sink = Arc::new(CountingSink::default());
        let tracker = TaskTracker::new(sink.clone());

        tracker
            .run_all(vec![
                TrackedOp::new(Operation::RefreshPrices, async { Ok(()) }),
                TrackedOp::new(Operation::RefreshAllowanceAndMetrics, async { Ok(()) }),
            ])
            .await;

        let log = sink.log.lock().unwrap();
        assert!(log[0].1 && log[1].1);
        assert!(!log[2].1 && !log[3].1);
    }
}
