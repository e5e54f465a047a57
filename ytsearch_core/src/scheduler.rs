//! Cooperative Scheduler (§4.D): starts cold tasks as resources permit, emits
//! completions in order-of-finish, and bundles per-task errors at the end.
//!
//! Grounded on the CPU pool's panic-guard-and-report idiom (`cpu_pool.rs`),
//! generalised from a fixed-size rayon pool running sync closures to an
//! async, resource-gated admission loop running `tokio` tasks.

use crate::error::{BundledError, Error, Result};
use crate::resource_monitor::ResourceMonitor;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type BoxedLauncher<R> =
    Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<R>> + Send>> + Send>;

/// A deferred unit of work; the scheduler owns its lifetime. `launcher` must be
/// idempotent-if-cancelled (§9).
pub struct ColdTask<R> {
    pub name: String,
    launcher: BoxedLauncher<R>,
}

impl<R> ColdTask<R> {
    pub fn new<F, Fut>(name: impl Into<String>, launcher: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            name: name.into(),
            launcher: Box::new(move |token| Box::pin(launcher(token))),
        }
    }
}

#[derive(Debug, Default)]
pub struct SchedulerCounters {
    pub queued: AtomicUsize,
    pub running: AtomicUsize,
    pub completed: AtomicUsize,
}

impl SchedulerCounters {
    fn new(queued: usize) -> Self {
        Self {
            queued: AtomicUsize::new(queued),
            running: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.queued.load(Ordering::Relaxed),
            self.running.load(Ordering::Relaxed),
            self.completed.load(Ordering::Relaxed),
        )
    }
}

pub struct Scheduler {
    resource_monitor: Arc<ResourceMonitor>,
    delay_between_heat_ups: Duration,
}

impl Scheduler {
    pub fn new(resource_monitor: Arc<ResourceMonitor>, delay_between_heat_ups: Duration) -> Self {
        Self {
            resource_monitor,
            delay_between_heat_ups,
        }
    }

    /// Runs every task, emitting `(name, result)` in completion order. The
    /// returned counters are updated live as tasks transition state (§4.D).
    pub fn run<R>(
        &self,
        tasks: Vec<ColdTask<R>>,
        cancel: CancellationToken,
    ) -> (BoxStream<'static, (String, Result<R>)>, Arc<SchedulerCounters>)
    where
        R: Send + 'static,
    {
        let counters = Arc::new(SchedulerCounters::new(tasks.len()));
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = self.resource_monitor.clone();
        let delay = self.delay_between_heat_ups;
        let counters_bg = counters.clone();

        tokio::spawn(async move {
            let mut queue: VecDeque<ColdTask<R>> = tasks.into_iter().collect();
            let mut join_set: JoinSet<(String, Result<R>)> = JoinSet::new();

            loop {
                while !queue.is_empty() {
                    let can_start = join_set.is_empty() || monitor.has_sufficient();
                    if !can_start || cancel.is_cancelled() {
                        break;
                    }
                    let task = queue.pop_front().expect("checked non-empty");
                    let name = task.name.clone();
                    let token = cancel.child_token();
                    counters_bg.queued.fetch_sub(1, Ordering::Relaxed);
                    counters_bg.running.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "ytsearch.scheduler", name = %name, "heating up task");
                    let fut = (task.launcher)(token);
                    join_set.spawn(async move { (name, fut.await) });
                }

                if join_set.is_empty() {
                    if queue.is_empty() || cancel.is_cancelled() {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }

                match join_set.join_next().await {
                    Some(Ok((name, result))) => {
                        counters_bg.running.fetch_sub(1, Ordering::Relaxed);
                        counters_bg.completed.fetch_add(1, Ordering::Relaxed);
                        if tx.send((name, result)).is_err() {
                            break;
                        }
                    }
                    Some(Err(join_err)) => {
                        counters_bg.running.fetch_sub(1, Ordering::Relaxed);
                        warn!(target: "ytsearch.scheduler", error = %join_err, "task join failed");
                        let _ = tx.send(("<unknown>".to_string(), Err(Error::transport(join_err.to_string()))));
                    }
                    None => {}
                }

                if !cancel.is_cancelled() && !queue.is_empty() && join_set.len() < queue.len().max(1) {
                    tokio::time::sleep(delay).await;
                }
            }
        });

        (Box::pin(ReceiverStream { rx }), counters)
    }

    /// Fire-and-forget variant (§4.D): awaits every task, bundling failures
    /// into one `BundledError` tagged by task name.
    pub async fn run_all<R>(&self, tasks: Vec<ColdTask<R>>, cancel: CancellationToken) -> Result<Vec<R>>
    where
        R: Send + 'static,
    {
        let (mut stream, _counters) = self.run(tasks, cancel);
        let mut results = Vec::new();
        let mut failures = Vec::new();
        while let Some((name, item)) = stream.next().await {
            match item {
                Ok(r) => results.push(r),
                Err(Error::Cancelled) => {}
                Err(e) => failures.push((name, e)),
            }
        }
        if failures.is_empty() {
            Ok(results)
        } else {
            Err(Error::Bundled(BundledError::new(failures)))
        }
    }
}

struct ReceiverStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Stream for ReceiverStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_monitor::default_high_load_threshold;

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(ResourceMonitor::new(default_high_load_threshold())),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn runs_all_tasks_to_completion() {
        let tasks = (0..5)
            .map(|i| ColdTask::new(format!("t{i}"), move |_token| async move { Ok(i) }))
            .collect();
        let results = scheduler().run_all(tasks, CancellationToken::new()).await.unwrap();
        let mut sorted = results;
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn bundles_failures_with_task_names() {
        let tasks = vec![
            ColdTask::new("ok", |_| async { Ok(1) }),
            ColdTask::new("bad", |_| async { Err(Error::transport("boom")) }),
        ];
        let err = scheduler().run_all(tasks, CancellationToken::new()).await.unwrap_err();
        match err {
            Error::Bundled(b) => {
                assert_eq!(b.failures.len(), 1);
                assert_eq!(b.failures[0].0, "bad");
            }
            other => panic!("expected bundled error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn starts_first_task_unconditionally() {
        // Even with an artificially strict monitor, a scheduler with no running
        // tasks must start the first one (§8 property 4).
        let tasks = vec![ColdTask::new("solo", |_| async { Ok(42) })];
        let results = scheduler().run_all(tasks, CancellationToken::new()).await.unwrap();
        assert_eq!(results, vec![42]);
    }
}
