//! Tracks and reports how many workers have completed.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Notify, time};

/// The amount of completed workers at some point of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// The amount of workers that returned.
    pub completed: usize,
    /// The amount of dispatched workers.
    pub total: usize,
}

impl ProgressSnapshot {
    /// Returns true if every worker returned.
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// The shared completion counter of a run.
#[derive(Debug)]
pub struct Progress {
    completed: AtomicUsize,
    total: usize,
    done: Notify,
}

impl Progress {
    /// Returns the counter for `total` workers.
    pub fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            done: Notify::new(),
        }
    }

    /// Returns the current state of the run.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire).min(self.total),
            total: self.total,
        }
    }

    fn finish_one(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed >= self.total {
            self.done.notify_one();
        }
    }
}

/// Marks a worker as completed when dropped, even if the worker panicked.
#[must_use = "the worker is marked as completed as soon as the guard is dropped"]
pub struct CompletionGuard(Arc<Progress>);

impl CompletionGuard {
    /// Returns the guard of a worker tracked by the provided counter.
    pub fn new(progress: Arc<Progress>) -> Self {
        Self(progress)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.finish_one();
    }
}

/// The shortest period of the progress report.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Logs the progress of the run every `period`, until every worker completed.
///
/// A period shorter than [`MIN_PERIOD`] is raised to it. Returns the last reported snapshot.
pub async fn monitor(progress: Arc<Progress>, period: Duration) -> ProgressSnapshot {
    let mut interval = time::interval(period.max(MIN_PERIOD));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        let snapshot = progress.snapshot();
        tracing::info!("Progress: {snapshot} batches completed");
        if snapshot.is_complete() {
            return snapshot;
        }

        tokio::select! {
            _ = interval.tick() => (),
            _ = progress.done.notified() => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{CompletionGuard, Progress, ProgressSnapshot, monitor};

    #[test]
    fn never_over_total() {
        let progress = Arc::new(Progress::new(2));
        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                completed: 0,
                total: 2
            }
        );

        for _ in 0..3 {
            drop(CompletionGuard::new(progress.clone()));
            let snapshot = progress.snapshot();
            assert!(snapshot.completed <= snapshot.total);
        }
        assert!(progress.snapshot().is_complete());
        assert_eq!(progress.snapshot().to_string(), "2/2");
    }

    #[test]
    fn empty_run_is_complete() {
        assert!(Progress::new(0).snapshot().is_complete());
    }

    #[tokio::test]
    async fn monitor_ends_when_all_completed() {
        let progress = Arc::new(Progress::new(3));
        let monitor = tokio::spawn(monitor(progress.clone(), Duration::from_secs(3600)));

        let workers = (0..3u64)
            .map(|i| {
                let guard = CompletionGuard::new(progress.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10 * i)).await;
                    drop(guard);
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.await.unwrap();
        }

        // Completes without waiting for the next tick.
        let last = tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .expect("monitor should stop once every worker completed")
            .unwrap();
        assert_eq!(
            last,
            ProgressSnapshot {
                completed: 3,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn zero_period_is_raised() {
        let progress = Arc::new(Progress::new(1));
        let guard = CompletionGuard::new(progress.clone());
        let monitor = tokio::spawn(monitor(progress.clone(), Duration::ZERO));

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);

        let last = tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .expect("monitor should stop once every worker completed")
            .expect("monitor shouldn't panic with a zero period");
        assert!(last.is_complete());
    }

    #[tokio::test]
    async fn guard_counts_panicked_worker() {
        let progress = Arc::new(Progress::new(1));
        let guard = CompletionGuard::new(progress.clone());
        let res = tokio::spawn(async move {
            let _guard = guard;
            panic!("worker failure");
        })
        .await;

        assert!(res.is_err());
        assert!(progress.snapshot().is_complete());
    }
}
