//! Periodic tasks.
//!
//! A request with a repeat interval re-runs on a timer until it is
//! cancelled or its repeat count runs out. Each tick first consults the
//! rate-limit gate; a suppressed tick reports a skipped response and does
//! no I/O.
//!
//! The [`TaskRegistry`] allows one live task per request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sigil_core::{QueryResult, Response, TaskOptions};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::ClientError;
use crate::request::{Request, RequestId};

// ============================================================================
// Registry
// ============================================================================

/// Live periodic tasks, keyed by request.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task for `id`.
    ///
    /// The entry lives as long as the returned guard.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TaskAlreadyRegistered`] if `id` already has a
    /// live task.
    pub fn register(self: &Arc<Self>, id: RequestId) -> Result<TaskGuard, ClientError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&id) {
            return Err(ClientError::TaskAlreadyRegistered);
        }
        let token = CancellationToken::new();
        tasks.insert(id, token.clone());
        debug!(request = %id, "Registered periodic task");
        Ok(TaskGuard {
            registry: Arc::clone(self),
            id,
            token,
        })
    }

    /// Returns true if `id` has a live task.
    pub fn is_registered(&self, id: RequestId) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Returns the number of live tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no task is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every live task and returns how many were signalled.
    ///
    /// Entries go away as each task observes the cancellation.
    pub fn cancel_all(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for token in tasks.values() {
            token.cancel();
        }
        tasks.len()
    }

    fn remove(&self, id: RequestId) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Keeps a registry entry alive; dropping it removes the entry.
#[derive(Debug)]
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    id: RequestId,
    token: CancellationToken,
}

impl TaskGuard {
    /// Returns the task's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the request the task runs for.
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        debug!(request = %self.id, "Unregistered periodic task");
    }
}

// ============================================================================
// Periodic Task
// ============================================================================

/// Why a periodic task stopped.
#[derive(Debug)]
pub enum TaskEnd {
    /// The task was cancelled.
    Cancelled,
    /// The repeat count ran out.
    Exhausted,
    /// A tick failed and `continue_on_error` was not set.
    Stopped,
    /// A tick could not be prepared and `continue_on_error` was not set.
    Failed(ClientError),
}

/// A registered periodic task.
#[derive(Debug)]
pub struct PeriodicTask {
    options: TaskOptions,
    guard: TaskGuard,
}

impl PeriodicTask {
    /// Creates a task from its options and registry entry.
    pub fn new(options: TaskOptions, guard: TaskGuard) -> Self {
        Self { options, guard }
    }

    /// Runs ticks until cancelled, exhausted, or stopped by an error.
    ///
    /// `tick` runs one full call. `on_response` fires once per tick,
    /// skipped ticks included. The registry entry is released on return.
    #[instrument(skip_all, fields(request = %self.guard.id(), interval_ms = self.interval_ms()))]
    pub async fn run<T, Fut, F>(self, request: &Request, mut tick: T, mut on_response: F) -> TaskEnd
    where
        T: FnMut() -> Fut,
        Fut: Future<Output = Result<Response, ClientError>>,
        F: FnMut(&Request, Response),
    {
        let token = self.guard.token().clone();
        let options = &self.options;

        if !options.due_time.is_zero() {
            tokio::select! {
                () = token.cancelled() => return TaskEnd::Cancelled,
                () = tokio::time::sleep(options.due_time) => {}
            }
        }

        let period = options.repeat_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u32;

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    info!(ticks, "Periodic task cancelled");
                    return TaskEnd::Cancelled;
                }
                _ = interval.tick() => {}
            }

            let skip = options.rate_limit.as_ref().is_some_and(|rule| rule.should_skip());
            if skip {
                debug!(tick = ticks + 1, "Tick skipped by rate limit");
                request.task_state().record_tick(true);
                on_response(request, Response::from_result(QueryResult::skipped()));
            } else {
                match tick().await {
                    Ok(response) => {
                        let failed = response.exception.is_some();
                        request.task_state().record_tick(false);
                        on_response(request, response);
                        if failed && !options.continue_on_error {
                            warn!(tick = ticks + 1, "Tick failed; stopping periodic task");
                            return TaskEnd::Stopped;
                        }
                    }
                    Err(e) => {
                        warn!(tick = ticks + 1, error = %e, "Tick could not run");
                        request.task_state().record_tick(false);
                        if !options.continue_on_error {
                            return TaskEnd::Failed(e);
                        }
                    }
                }
            }

            ticks += 1;
            if options.repeat_times.is_some_and(|limit| ticks >= limit) {
                info!(ticks, "Periodic task exhausted");
                return TaskEnd::Exhausted;
            }
        }
    }

    fn interval_ms(&self) -> u64 {
        u64::try_from(self.options.repeat_interval.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use sigil_core::{FailureKind, RateLimitRule, RateLimitStatus, TransportFailure};

    use super::*;

    fn ok_response() -> Response {
        Response {
            status_code: 200,
            ..Response::default()
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");

        let guard = registry.register(request.id()).unwrap();
        let err = registry.register(request.clone().id()).unwrap_err();
        assert!(matches!(err, ClientError::TaskAlreadyRegistered));

        drop(guard);
        assert!(registry.is_empty());
        assert!(registry.register(request.id()).is_ok());
    }

    #[test]
    fn test_cancel_all_signals_tokens() {
        let registry = Arc::new(TaskRegistry::new());
        let a = registry.register(Request::get("/a").id()).unwrap();
        let b = registry.register(Request::get("/b").id()).unwrap();

        assert_eq!(registry.cancel_all(), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_repeat_times_ticks() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");
        let guard = registry.register(request.id()).unwrap();
        let task = PeriodicTask::new(
            TaskOptions::every(Duration::from_secs(5)).with_repeat_times(3),
            guard,
        );

        let calls = AtomicU32::new(0);
        let mut delivered = 0;
        let end = task
            .run(
                &request,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(ok_response()) }
                },
                |_, _| delivered += 1,
            )
            .await;

        assert!(matches!(end, TaskEnd::Exhausted));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(delivered, 3);
        assert_eq!(request.task_state().ticks(), 3);
        assert!(!registry.is_registered(request.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_skips_without_io() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");
        let guard = registry.register(request.id()).unwrap();
        let rule = RateLimitRule::by_percent(20.0).with_status(|| {
            Some(RateLimitStatus {
                remaining_hits: 5,
                hourly_limit: 100,
                reset_time: None,
            })
        });
        let task = PeriodicTask::new(
            TaskOptions::every(Duration::from_secs(1))
                .with_repeat_times(2)
                .with_rate_limit(rule),
            guard,
        );

        let calls = AtomicU32::new(0);
        let mut skipped = Vec::new();
        task.run(
            &request,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ok_response()) }
            },
            |_, response| skipped.push(response.skipped_due_to_rate_limiting),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(skipped, vec![true, true]);
        assert_eq!(request.task_state().skipped(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_stops_task() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");
        let guard = registry.register(request.id()).unwrap();
        let task = PeriodicTask::new(TaskOptions::every(Duration::from_secs(1)), guard);

        let mut delivered = 0;
        let end = task
            .run(
                &request,
                || async {
                    Ok(Response {
                        exception: Some(TransportFailure::new(FailureKind::Connect, "refused")),
                        ..Response::default()
                    })
                },
                |_, _| delivered += 1,
            )
            .await;

        assert!(matches!(end, TaskEnd::Stopped));
        assert_eq!(delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_on_error_keeps_ticking() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");
        let guard = registry.register(request.id()).unwrap();
        let task = PeriodicTask::new(
            TaskOptions::every(Duration::from_secs(1))
                .with_repeat_times(3)
                .continue_on_error(),
            guard,
        );

        let mut delivered = 0;
        let end = task
            .run(
                &request,
                || async {
                    Ok(Response {
                        exception: Some(TransportFailure::timeout()),
                        ..Response::default()
                    })
                },
                |_, _| delivered += 1,
            )
            .await;

        assert!(matches!(end, TaskEnd::Exhausted));
        assert_eq!(delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_due_time() {
        let registry = Arc::new(TaskRegistry::new());
        let request = Request::get("/poll");
        let guard = registry.register(request.id()).unwrap();
        let token = guard.token().clone();
        let task = PeriodicTask::new(
            TaskOptions::every(Duration::from_secs(1)).with_due_time(Duration::from_secs(60)),
            guard,
        );

        token.cancel();
        let mut delivered = 0;
        let end = task
            .run(&request, || async { Ok(ok_response()) }, |_, _| delivered += 1)
            .await;

        assert!(matches!(end, TaskEnd::Cancelled));
        assert_eq!(delivered, 0);
        assert!(registry.is_empty());
    }
}
