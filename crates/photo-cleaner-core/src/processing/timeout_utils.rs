use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use thiserror::Error;

type Task<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// Why a timed task produced no value
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Panicked(String),

    #[error("failed to start helper thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Too many abandoned helpers are still running; nothing was started
    #[error("{0} timed-out task(s) still running")]
    Saturated(usize),
}

/// Abandoned helpers allowed by `TimedExecutor::new`
pub const DEFAULT_MAX_STRANDED: usize = 4;

/// Extract panic info from panic value
pub fn extract_panic_info(panic_err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_err.downcast_ref::<&str>() {
        format!("Panic with message: {}", s)
    } else if let Some(s) = panic_err.downcast_ref::<String>() {
        format!("Panic with message: {}", s)
    } else {
        "Unknown panic occurred".to_string()
    }
}

struct Helper<T> {
    tasks: Sender<Task<T>>,
    results: Receiver<thread::Result<T>>,
}

/// Held by a helper thread for as long as it runs
struct LiveHelper(Arc<AtomicUsize>);

impl Drop for LiveHelper {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs tasks on a long-lived helper thread with a deadline.
///
/// A task that overruns its deadline cannot be interrupted. Its helper is
/// abandoned (it exits once the task returns) and the next call starts a
/// fresh one, so the owning worker never blocks past the deadline.
/// Once `max_stranded` abandoned helpers are still busy, `run` refuses new
/// work with `Saturated` until one of them finishes.
pub struct TimedExecutor<T: Send + 'static> {
    name: String,
    helper: Option<Helper<T>>,
    spawned: usize,
    live: Arc<AtomicUsize>,
    max_stranded: usize,
}

impl<T: Send + 'static> TimedExecutor<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_stranded_limit(name, DEFAULT_MAX_STRANDED)
    }

    pub fn with_stranded_limit(name: impl Into<String>, max_stranded: usize) -> Self {
        Self {
            name: name.into(),
            helper: None,
            spawned: 0,
            live: Arc::new(AtomicUsize::new(0)),
            max_stranded: max_stranded.max(1),
        }
    }

    /// Number of helper threads started so far
    pub fn helpers_spawned(&self) -> usize {
        self.spawned
    }

    /// Abandoned helpers whose task has not returned yet
    pub fn stranded(&self) -> usize {
        let live = self.live.load(Ordering::Acquire);
        live.saturating_sub(usize::from(self.helper.is_some()))
    }

    /// Execute `task`, waiting at most `timeout` for its result.
    /// Panics inside the task are caught and reported as `Panicked`.
    pub fn run<F>(&mut self, timeout: Duration, task: F) -> Result<T, ExecutionError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let helper = match self.helper.take() {
            Some(helper) => helper,
            None => self.spawn_helper()?,
        };

        // A helper only disappears when its thread is gone; start another
        let helper = match helper.tasks.send(Box::new(task)) {
            Ok(()) => helper,
            Err(channel::SendError(task)) => {
                let fresh = self.spawn_helper()?;
                fresh
                    .tasks
                    .send(task)
                    .map_err(|_| ExecutionError::Panicked("helper thread exited".to_string()))?;
                fresh
            }
        };

        match helper.results.recv_timeout(timeout) {
            Ok(Ok(value)) => {
                self.helper = Some(helper);
                Ok(value)
            }
            Ok(Err(panic_err)) => {
                self.helper = Some(helper);
                Err(ExecutionError::Panicked(extract_panic_info(panic_err)))
            }
            Err(RecvTimeoutError::Timeout) => {
                drop(helper);
                warn!(
                    "TIMEOUT: {} task exceeded {:?}, abandoning helper ({} stranded, limit {})",
                    self.name,
                    timeout,
                    self.stranded(),
                    self.max_stranded
                );
                Err(ExecutionError::TimedOut(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ExecutionError::Panicked("helper thread exited".to_string()))
            }
        }
    }

    /// Only called while `self.helper` is empty, so every live helper is stranded
    fn spawn_helper(&mut self) -> Result<Helper<T>, ExecutionError> {
        let stranded = self.live.load(Ordering::Acquire);
        if stranded >= self.max_stranded {
            debug!("{}: {} stranded helper(s), refusing work", self.name, stranded);
            return Err(ExecutionError::Saturated(stranded));
        }

        let (task_tx, task_rx) = channel::bounded::<Task<T>>(1);
        let (result_tx, result_rx) = channel::bounded::<thread::Result<T>>(1);

        self.spawned += 1;
        let thread_name = format!("{}-helper-{}", self.name, self.spawned);
        debug!("Starting {}", thread_name);

        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveHelper(Arc::clone(&self.live));

        thread::Builder::new().name(thread_name).spawn(move || {
            let _guard = guard;
            for task in task_rx {
                let result = panic::catch_unwind(AssertUnwindSafe(task));
                if result_tx.send(result).is_err() {
                    // Owner gave up on us
                    break;
                }
            }
        })?;

        Ok(Helper {
            tasks: task_tx,
            results: result_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_completes_within_timeout() {
        let mut executor = TimedExecutor::new("test");
        let value = executor.run(Duration::from_secs(5), || 21 * 2).unwrap();
        assert_eq!(value, 42);

        // Helper is reused
        let value = executor.run(Duration::from_secs(5), || 7).unwrap();
        assert_eq!(value, 7);
        assert_eq!(executor.helpers_spawned(), 1);
    }

    #[test]
    fn test_panic_is_reported() {
        let mut executor: TimedExecutor<u32> = TimedExecutor::new("test");
        let result = executor.run(Duration::from_secs(5), || panic!("decoder exploded"));
        match result {
            Err(ExecutionError::Panicked(msg)) => assert!(msg.contains("decoder exploded")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        // The helper survives a caught panic
        assert_eq!(executor.run(Duration::from_secs(5), || 1).unwrap(), 1);
        assert_eq!(executor.helpers_spawned(), 1);
    }

    #[test]
    fn test_timeout_replaces_helper() {
        let mut executor = TimedExecutor::new("test");
        let result = executor.run(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert!(matches!(result, Err(ExecutionError::TimedOut(_))));

        let value = executor.run(Duration::from_secs(5), || 2).unwrap();
        assert_eq!(value, 2);
        assert_eq!(executor.helpers_spawned(), 2);
    }

    #[test]
    fn test_stranded_helpers_are_capped() {
        let mut executor = TimedExecutor::with_stranded_limit("test", 1);
        let result = executor.run(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(300));
            1
        });
        assert!(matches!(result, Err(ExecutionError::TimedOut(_))));
        assert_eq!(executor.stranded(), 1);

        // Refused without starting anything
        let result = executor.run(Duration::from_secs(5), || 2);
        assert!(matches!(result, Err(ExecutionError::Saturated(1))));
        assert_eq!(executor.helpers_spawned(), 1);

        // The stranded task returns, its helper exits, and work resumes
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while executor.stranded() > 0 {
            assert!(std::time::Instant::now() < deadline, "helper never exited");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(executor.run(Duration::from_secs(5), || 3).unwrap(), 3);
        assert_eq!(executor.stranded(), 0);
    }
}
