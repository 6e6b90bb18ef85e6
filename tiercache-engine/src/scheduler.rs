//! Coordinator-owned task scheduler.
//!
//! Every timer the engine arms (lock auto-release, refresh timers, interval
//! scans, persistence and metrics hooks) is a tokio task registered here under
//! a [`TaskId`]. Tasks can be cancelled individually and are all aborted by
//! [`Scheduler::shutdown`]. After shutdown nothing new is scheduled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle for a scheduled task.
pub type TaskId = u64;

struct SchedulerInner {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, JoinHandle<()>>>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerInner {
    fn forget(&self, id: TaskId) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.remove(&id);
        }
    }
}

/// Cheaply cloneable handle to the shared task table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.active_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Run `task` once after `delay`.
    ///
    /// Returns `None` after shutdown or outside a tokio runtime.
    pub fn schedule_once<F>(&self, name: &'static str, delay: Duration, task: F) -> Option<TaskId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let weak = Arc::downgrade(&self.inner);
        self.spawn(name, id, async move {
            tokio::time::sleep(delay).await;
            task.await;
            if let Some(inner) = weak.upgrade() {
                inner.forget(id);
            }
        })
    }

    /// Run `task` every `period`, first after one full period. Missed ticks
    /// are skipped rather than bunched up.
    pub fn schedule_every<F, Fut>(
        &self,
        name: &'static str,
        period: Duration,
        task: F,
    ) -> Option<TaskId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::warn!(task = name, "Refusing to schedule periodic task with zero period");
            return None;
        }

        let id = self.next_id();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        self.spawn(name, id, async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!(task = name, "Periodic task shutting down");
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        task().await;
                    }
                }
            }
        })
    }

    /// Cancel a task. Returns whether it was still registered.
    pub fn cancel(&self, id: TaskId) -> bool {
        let handle = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.remove(&id),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of registered tasks that have not finished.
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .map(|tasks| tasks.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Abort every task and refuse new ones.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(true);

        let drained: Vec<JoinHandle<()>> = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.drain().map(|(_, handle)| handle).collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        for handle in drained {
            handle.abort();
        }

        tracing::info!(tasks = count, "Scheduler shut down");
    }

    fn next_id(&self) -> TaskId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn<F>(&self, name: &'static str, id: TaskId, future: F) -> Option<TaskId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            tracing::debug!(task = name, "Scheduler closed, task not scheduled");
            return None;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(task = name, error = %e, "No tokio runtime, task not scheduled");
                return None;
            }
        };

        let mut tasks = match self.inner.tasks.lock() {
            Ok(tasks) => tasks,
            Err(_) => return None,
        };
        tasks.retain(|_, handle| !handle.is_finished());
        // Spawn while holding the table so a fast task cannot forget itself
        // before it is registered.
        tasks.insert(id, runtime.spawn(future));
        drop(tasks);

        tracing::trace!(task = name, id, "Scheduled task");
        Some(id)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
