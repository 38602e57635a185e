use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use super::progress::ProgressEvent;
use super::{SessionId, SessionStatus};
use crate::deduplication::DuplicateCluster;
use crate::logging::log_session_transition;
use crate::types::ImageRecord;

/// Everything the orchestrator mutates for one session
#[derive(Debug)]
pub(crate) struct SessionState {
    pub status: SessionStatus,
    pub processed_count: usize,
    pub total_count: usize,
    pub events: Vec<ProgressEvent>,
    pub records: Vec<ImageRecord>,
    pub clusters: Vec<DuplicateCluster>,

    /// Reason the session failed
    pub fault: Option<String>,

    /// Set once no worker can touch the state again
    pub finalized: bool,
}

impl SessionState {
    /// Count one more finished file and publish an event for it
    pub fn advance(&mut self, current_file: &str) {
        self.processed_count += 1;
        self.events.push(ProgressEvent {
            processed_count: self.processed_count,
            total_count: self.total_count,
            current_file: Some(current_file.to_string()),
        });
    }
}

pub(crate) struct Session {
    pub id: SessionId,
    cancel_requested: AtomicBool,
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                status: SessionStatus::Queued,
                processed_count: 0,
                total_count: 0,
                events: Vec::new(),
                records: Vec::new(),
                clusters: Vec::new(),
                fault: None,
                finalized: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Lock the state. A panic while holding the lock cannot leave it
    /// half-written in a way readers care about, so poisoning is ignored.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `update` under the lock and wake every waiter
    pub fn update<R>(&self, update: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = update(&mut self.state());
        self.changed.notify_all();
        result
    }

    /// Block until `ready` holds, returning the locked state
    pub fn wait_until(
        &self,
        mut ready: impl FnMut(&SessionState) -> bool,
    ) -> MutexGuard<'_, SessionState> {
        let mut state = self.state();
        while !ready(&state) {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state
    }

    /// Move to `to`, logging the transition
    pub fn transition(&self, state: &mut SessionState, to: SessionStatus) {
        log_session_transition(self.id, state.status, to);
        state.status = to;
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}
