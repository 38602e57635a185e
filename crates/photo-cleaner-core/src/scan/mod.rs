//! Scan sessions: submission, progress, cancellation and results.
//!
//! A session moves `Queued -> Running -> {Completed, Cancelled, Failed}`.
//! Per-file problems are recorded against the file and never fail the
//! session; only an index fault does.

mod progress;
mod session;
mod worker;

pub use progress::{ProgressEvent, ProgressStream};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::deduplication::DuplicateCluster;
use crate::error::{Error, Result};
use crate::index::{build_index, SimilarityIndex};
use crate::types::{FailedFile, ImageRecord, InputBlob};
use session::Session;

/// Handle of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Queued,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Cancelled | SessionStatus::Completed | SessionStatus::Failed
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final outcome of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub session_id: SessionId,
    pub status: SessionStatus,

    /// Duplicate clusters ordered by their earliest member
    pub clusters: Vec<DuplicateCluster>,

    /// Files that could not be fingerprinted, in submission order
    pub failed_files: Vec<FailedFile>,

    /// Every accepted file, indexed by `ImageId`
    pub records: Vec<ImageRecord>,

    pub processed_count: usize,
    pub total_count: usize,
}

impl ScanResults {
    pub fn record(&self, id: crate::types::ImageId) -> Option<&ImageRecord> {
        self.records.get(id.0 as usize)
    }
}

/// Owns scan sessions and the threads running them
pub struct ScanService {
    config: Config,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
}

impl ScanService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a session for `blobs` and start scanning them
    pub fn submit_files(&self, blobs: Vec<InputBlob>) -> Result<SessionId> {
        self.submit_files_with_index(blobs, build_index(&self.config))
    }

    /// `submit_files` backed by a caller-built index instead of the configured one
    pub(crate) fn submit_files_with_index(
        &self,
        blobs: Vec<InputBlob>,
        index: Box<dyn SimilarityIndex>,
    ) -> Result<SessionId> {
        let id = self.queue_files(blobs.len());
        self.launch(id, blobs, index)?;
        Ok(id)
    }

    /// Progress events of a session, from the first one
    pub fn subscribe_progress(&self, id: SessionId) -> Result<ProgressStream> {
        Ok(ProgressStream::new(self.session(id)?))
    }

    /// Results of a finished session.
    ///
    /// Completed sessions return everything; cancelled ones return what was
    /// resolved before the cancellation, once in-flight files have drained.
    /// A failed session returns its fault instead of clusters.
    pub fn get_results(&self, id: SessionId) -> Result<ScanResults> {
        let session = self.session(id)?;

        let status = session.state().status;
        if !status.is_terminal() {
            return Err(Error::ResultsNotReady(id, status));
        }

        let state = session.wait_until(|state| state.finalized);
        if let Some(fault) = &state.fault {
            return Err(Error::IndexFault(fault.clone()));
        }

        Ok(ScanResults {
            session_id: id,
            status: state.status,
            clusters: state.clusters.clone(),
            failed_files: state
                .records
                .iter()
                .filter_map(|record| record.failure.clone())
                .collect(),
            records: state.records.clone(),
            processed_count: state.processed_count,
            total_count: state.total_count,
        })
    }

    /// Stop a running session. Files already being decoded finish first.
    pub fn cancel(&self, id: SessionId) -> Result<()> {
        let session = self.session(id)?;
        session.update(|state| {
            if state.status != SessionStatus::Running {
                return Err(Error::InvalidState {
                    session: id,
                    status: state.status,
                    action: "cancel",
                });
            }
            session.request_cancel();
            session.transition(state, SessionStatus::Cancelled);
            Ok(())
        })
    }

    pub fn status(&self, id: SessionId) -> Result<SessionStatus> {
        Ok(self.session(id)?.state().status)
    }

    /// Block until the session is terminal and its results are final
    pub fn wait(&self, id: SessionId) -> Result<SessionStatus> {
        let session = self.session(id)?;
        let state = session.wait_until(|state| state.finalized);
        Ok(state.status)
    }

    /// Forget a finished session
    pub fn remove(&self, id: SessionId) -> Result<()> {
        let mut sessions = self.sessions();
        let session = sessions.get(&id).ok_or(Error::SessionNotFound(id))?;

        let state = session.state();
        if !state.finalized {
            return Err(Error::InvalidState {
                session: id,
                status: state.status,
                action: "remove",
            });
        }
        drop(state);

        sessions.remove(&id);
        info!("Scan {} removed", id);
        Ok(())
    }

    /// Ids of all sessions currently held, ascending
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions().keys().copied().collect();
        ids.sort();
        ids
    }

    fn queue_files(&self, count: usize) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions().insert(id, Arc::new(Session::new(id)));
        info!("Scan {} queued with {} file(s)", id, count);
        id
    }

    /// Queued -> Running, then hand the session to its coordinator thread
    fn launch(
        &self,
        id: SessionId,
        blobs: Vec<InputBlob>,
        index: Box<dyn SimilarityIndex>,
    ) -> Result<()> {
        let session = self.session(id)?;
        session.update(|state| session.transition(state, SessionStatus::Running));

        let config = self.config.clone();
        let runner = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name(format!("scan-{}", id))
            .spawn(move || worker::run_session(runner, blobs, config, index));

        if let Err(e) = spawned {
            session.update(|state| {
                state.fault = Some(format!("failed to start scan thread: {}", e));
                session.transition(state, SessionStatus::Failed);
                state.finalized = true;
            });
            return Err(Error::Io(e));
        }
        Ok(())
    }

    fn session(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions()
            .get(&id)
            .cloned()
            .ok_or(Error::SessionNotFound(id))
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
