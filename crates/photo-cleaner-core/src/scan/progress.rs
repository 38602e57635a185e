use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::session::Session;

/// One step of a scan's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Files finished so far, successful or not. Never decreases.
    pub processed_count: usize,

    pub total_count: usize,

    /// The file whose completion produced this event
    pub current_file: Option<String>,
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        self.processed_count == self.total_count
    }

    /// Completed fraction in [0, 1]; an empty scan counts as done
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            1.0
        } else {
            self.processed_count as f64 / self.total_count as f64
        }
    }
}

/// Blocking iterator over a session's progress events.
///
/// Every stream starts from the session's first event, and
/// [`restart`](Self::restart) rewinds it there again. Iteration ends once
/// the session is terminal and its results are final.
pub struct ProgressStream {
    session: Arc<Session>,
    next: usize,
}

impl ProgressStream {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session, next: 0 }
    }

    /// Rewind to the first event
    pub fn restart(&mut self) {
        self.next = 0;
    }

    /// Return the next event if one is already available, without blocking
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        let state = self.session.state();
        let event = state.events.get(self.next).cloned();
        if event.is_some() {
            self.next += 1;
        }
        event
    }
}

impl Iterator for ProgressStream {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        let state = self
            .session
            .wait_until(|state| self.next < state.events.len() || state.finalized);

        let event = state.events.get(self.next).cloned();
        if event.is_some() {
            self.next += 1;
        }
        event
    }
}
