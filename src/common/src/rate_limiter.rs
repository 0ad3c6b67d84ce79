//! Process-wide rate limiter for the data API.
//!
//! All upstream requests go through one serialized execution slot. Waiting
//! tasks are ordered by priority (higher first), then by submission order.
//! Before a task starts, the limiter sleeps until at least `min_interval` has
//! passed since the previous task finished, so consecutive starts are never
//! closer than `min_interval` no matter how many callers submit at once.
//!
//! Construct one instance at start-up, wrap it in `Arc`, and hand it to every
//! client that talks to the rate-limited endpoint.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::Config;

/// Minimum gap between upstream requests.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1200);

/// Hard budget for one task, including its network round trip.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimiterError {
    #[error("Task cancelled before it started")]
    Cancelled,

    #[error("Task exceeded the {0:?} timeout")]
    Timeout(Duration),
}

/// Instantaneous queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStatus {
    pub queued: usize,
    pub running: usize,
}

/// A task waiting for the execution slot.
struct Waiter {
    priority: i32,
    seq: u64,
    grant: oneshot::Sender<Permit>,
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the earlier submission
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

struct State {
    queue: BinaryHeap<Waiter>,
    running: bool,
    last_finished: Option<Instant>,
    next_seq: u64,
}

struct Shared {
    state: Mutex<State>,
    min_interval: Duration,
    task_timeout: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder; keep serving
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of the execution slot. Dropping it frees the slot and wakes the
/// next waiter, which also covers callers that are dropped mid-task.
struct Permit {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.shared.lock();
            state.running = false;
            state.last_finished = Some(Instant::now());
        }
        dispatch(&self.shared);
    }
}

/// Hand the slot to the best waiter if it is free.
fn dispatch(shared: &Arc<Shared>) {
    loop {
        let waiter = {
            let mut state = shared.lock();
            if state.running {
                return;
            }
            match state.queue.pop() {
                Some(waiter) => {
                    state.running = true;
                    waiter
                }
                None => return,
            }
        };

        let permit = Permit {
            shared: Arc::clone(shared),
            armed: true,
        };
        match waiter.grant.send(permit) {
            Ok(()) => return,
            Err(mut permit) => {
                // Caller stopped waiting; try the next one
                permit.armed = false;
                shared.lock().running = false;
            }
        }
    }
}

/// Serialized, priority-ordered rate limiter.
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, task_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    running: false,
                    last_finished: None,
                    next_seq: 0,
                }),
                min_interval,
                task_timeout,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rate_limit_interval, config.task_timeout)
    }

    pub fn min_interval(&self) -> Duration {
        self.shared.min_interval
    }

    /// Run `task` under the rate constraint at default priority (0).
    pub async fn execute<T, E, F, Fut>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LimiterError>,
    {
        self.execute_with_priority(0, task).await
    }

    /// Run `task` under the rate constraint.
    ///
    /// Returns exactly what the task returns. Fails with
    /// `LimiterError::Cancelled` if `clear()` discards the task before it
    /// starts, and with `LimiterError::Timeout` if the task overruns the
    /// per-task budget. A failing task never stalls the queue.
    pub async fn execute_with_priority<T, E, F, Fut>(&self, priority: i32, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LimiterError>,
    {
        let (grant_tx, grant_rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter {
                priority,
                seq,
                grant: grant_tx,
            });
        }
        dispatch(&self.shared);

        // Sender dropped without a permit means clear() discarded us
        let permit = grant_rx.await.map_err(|_| LimiterError::Cancelled)?;

        let wait = {
            let state = self.shared.lock();
            state
                .last_finished
                .map(|finished| self.shared.min_interval.saturating_sub(finished.elapsed()))
                .unwrap_or_default()
        };
        if !wait.is_zero() {
            debug!("Rate limiter sleeping {:?} before next request", wait);
            tokio::time::sleep(wait).await;
        }

        let result = tokio::time::timeout(self.shared.task_timeout, task()).await;
        drop(permit);

        match result {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    "Rate-limited task timed out after {:?}",
                    self.shared.task_timeout
                );
                Err(LimiterError::Timeout(self.shared.task_timeout).into())
            }
        }
    }

    /// Current queue depth and whether the slot is taken.
    pub fn status(&self) -> LimiterStatus {
        let state = self.shared.lock();
        LimiterStatus {
            queued: state.queue.len(),
            running: usize::from(state.running),
        }
    }

    /// Discard every task that has not started yet. Each discarded caller
    /// receives `LimiterError::Cancelled`; a running task is left alone.
    pub fn clear(&self) -> usize {
        let discarded: Vec<Waiter> = {
            let mut state = self.shared.lock();
            state.queue.drain().collect()
        };
        let count = discarded.len();
        drop(discarded);

        if count > 0 {
            info!("Rate limiter cleared {} queued tasks", count);
        }
        count
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_INTERVAL, TASK_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Limiter(LimiterError),
        Failed(&'static str),
    }

    impl From<LimiterError> for TestError {
        fn from(e: LimiterError) -> Self {
            TestError::Limiter(e)
        }
    }

    async fn wait_for(limiter: &RateLimiter, expected: LimiterStatus) {
        for _ in 0..1000 {
            if limiter.status() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("limiter never reached {:?}, got {:?}", expected, limiter.status());
    }

    #[tokio::test]
    async fn test_execute_returns_task_result() {
        let limiter = RateLimiter::new(Duration::from_millis(10), TASK_TIMEOUT);

        let ok: Result<u32, TestError> = limiter.execute(|| async { Ok(42) }).await;
        assert_eq!(ok, Ok(42));

        let err: Result<u32, TestError> = limiter
            .execute(|| async { Err(TestError::Failed("boom")) })
            .await;
        assert_eq!(err, Err(TestError::Failed("boom")));
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_queue() {
        let limiter = RateLimiter::new(Duration::from_millis(10), TASK_TIMEOUT);

        let results: Vec<Result<u32, TestError>> = join_all((0..3).map(|i| {
            limiter.execute(move || async move {
                if i == 1 {
                    Err(TestError::Failed("middle"))
                } else {
                    Ok(i)
                }
            })
        }))
        .await;

        assert_eq!(results[0], Ok(0));
        assert_eq!(results[1], Err(TestError::Failed("middle")));
        assert_eq!(results[2], Ok(2));
        assert_eq!(limiter.status(), LimiterStatus { queued: 0, running: 0 });
    }

    #[tokio::test]
    async fn test_consecutive_starts_respect_min_interval() {
        let interval = Duration::from_millis(100);
        let limiter = RateLimiter::new(interval, TASK_TIMEOUT);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let results: Vec<Result<(), TestError>> = join_all((0..5).map(|_| {
            let starts = Arc::clone(&starts);
            limiter.execute(move || async move {
                starts.lock().unwrap().push(Instant::now());
                Ok(())
            })
        }))
        .await;
        assert!(results.iter().all(|r| r.is_ok()));

        let mut starts = starts.lock().unwrap().clone();
        starts.sort();
        assert_eq!(starts.len(), 5);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= interval - Duration::from_millis(5),
                "gap {:?} shorter than {:?}",
                gap,
                interval
            );
        }
    }

    #[tokio::test]
    async fn test_higher_priority_runs_first() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(5), TASK_TIMEOUT));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter
                    .execute(move || async move {
                        release_rx.await.ok();
                        Ok::<_, TestError>(())
                    })
                    .await
            })
        };
        wait_for(&limiter, LimiterStatus { queued: 0, running: 1 }).await;

        let mut handles = Vec::new();
        for (i, (name, priority)) in [("low-1", 0), ("high", 5), ("low-2", 0)]
            .into_iter()
            .enumerate()
        {
            let limiter_task = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter_task
                    .execute_with_priority(priority, move || async move {
                        order.lock().unwrap().push(name);
                        Ok::<_, TestError>(())
                    })
                    .await
            }));
            wait_for(&limiter, LimiterStatus { queued: i + 1, running: 1 }).await;
        }

        release_tx.send(()).unwrap();
        assert!(blocker.await.unwrap().is_ok());
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(*order.lock().unwrap(), vec!["high", "low-1", "low-2"]);
    }

    #[tokio::test]
    async fn test_clear_cancels_queued_tasks() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(5), TASK_TIMEOUT));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter
                    .execute(move || async move {
                        release_rx.await.ok();
                        Ok::<_, TestError>("finished")
                    })
                    .await
            })
        };
        wait_for(&limiter, LimiterStatus { queued: 0, running: 1 }).await;

        let queued: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter
                        .execute(|| async { Ok::<_, TestError>("should not run") })
                        .await
                })
            })
            .collect();
        wait_for(&limiter, LimiterStatus { queued: 3, running: 1 }).await;

        assert_eq!(limiter.clear(), 3);
        assert_eq!(limiter.status(), LimiterStatus { queued: 0, running: 1 });

        release_tx.send(()).unwrap();
        assert_eq!(running.await.unwrap(), Ok("finished"));

        for handle in queued {
            assert_eq!(
                handle.await.unwrap(),
                Err(TestError::Limiter(LimiterError::Cancelled))
            );
        }
        assert_eq!(limiter.status(), LimiterStatus { queued: 0, running: 0 });
    }

    #[tokio::test]
    async fn test_timeout_frees_slot() {
        let limiter = RateLimiter::new(Duration::from_millis(5), Duration::from_millis(50));

        let slow: Result<(), TestError> = limiter
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(
            slow,
            Err(TestError::Limiter(LimiterError::Timeout(Duration::from_millis(50))))
        );

        let next: Result<&str, TestError> = limiter.execute(|| async { Ok("next") }).await;
        assert_eq!(next, Ok("next"));
    }

    #[test]
    fn test_status_starts_idle() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.status(), LimiterStatus { queued: 0, running: 0 });
        assert_eq!(limiter.min_interval(), MIN_INTERVAL);
        assert_eq!(limiter.clear(), 0);
    }
}
