//! The pipeline behind one scan session.
//!
//! A coordinator thread expands archives, then feeds a bounded job queue
//! read by a fixed pool of workers. Workers decode and hash under a
//! per-file deadline and send outcomes back to the coordinator, which is
//! the only writer of the similarity index and the session state.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info};

use super::session::Session;
use super::SessionStatus;
use crate::config::Config;
use crate::deduplication::{Clusterer, FingerprintEntry};
use crate::error::{Error, FailureKind, Result};
use crate::index::SimilarityIndex;
use crate::logging::log_file_failure;
use crate::processing::timeout_utils::ExecutionError;
use crate::processing::{
    expand_archives, fingerprint_blob, ArchiveLimits, DecodeOptions, Decoder, ExpandedEntry,
    ImageHashResult, TimedExecutor,
};
use crate::types::{DecodeStatus, FailedFile, ImageId, ImageRecord, InputBlob};

struct Job {
    id: ImageId,
    blob: InputBlob,
}

struct Outcome {
    id: ImageId,
    result: Result<ImageHashResult>,
}

/// Run a session to completion on the current thread
pub(crate) fn run_session(
    session: Arc<Session>,
    blobs: Vec<InputBlob>,
    config: Config,
    index: Box<dyn SimilarityIndex>,
) {
    let started = std::time::Instant::now();
    info!("Scan {} started with {} submitted file(s)", session.id, blobs.len());

    let fault = match prepare(&session, blobs, &config) {
        Ok(jobs) if jobs.is_empty() => None,
        Ok(jobs) => process(&session, jobs, &config, index).err(),
        Err(fault) => Some(fault),
    };

    session.update(|state| {
        match fault {
            Some(reason) => {
                error!("Scan {} failed: {}", session.id, reason);
                state.fault = Some(reason.to_string());
                state.clusters.clear();
                session.transition(state, SessionStatus::Failed);
            }
            None if state.status == SessionStatus::Running => {
                session.transition(state, SessionStatus::Completed);
            }
            None => {}
        }
        state.finalized = true;

        info!(
            "Scan {} finished as {} in {:.2?}: {}/{} file(s), {} cluster(s)",
            session.id,
            state.status,
            started.elapsed(),
            state.processed_count,
            state.total_count,
            state.clusters.len()
        );
    });
}

/// Expand archives and register a record for every resulting file.
/// Entries that already failed count as processed right away.
fn prepare(session: &Session, blobs: Vec<InputBlob>, config: &Config) -> Result<Vec<Job>> {
    let limits = ArchiveLimits {
        max_depth: config.max_archive_depth,
        max_entry_size: config.max_decode_alloc,
        max_entries: config.max_archive_entries,
        max_total_bytes: config.max_archive_bytes,
    };
    let entries = expand_archives(blobs, limits);

    session.update(|state| {
        state.total_count = entries.len();
        state.records.reserve(entries.len());

        if entries.is_empty() {
            state.events.push(super::ProgressEvent {
                processed_count: 0,
                total_count: 0,
                current_file: None,
            });
        }

        let mut jobs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let id = image_id(index)?;
            match entry {
                ExpandedEntry::Blob(blob) => {
                    state
                        .records
                        .push(ImageRecord::new(id, blob.name.clone(), blob.byte_size()));
                    jobs.push(Job { id, blob });
                }
                ExpandedEntry::Failed {
                    name,
                    byte_size,
                    error,
                } => {
                    let mut record = ImageRecord::new(id, name.clone(), byte_size);
                    mark_failed(&mut record, &error);
                    state.records.push(record);
                    state.advance(&name);
                }
            }
        }
        Ok(jobs)
    })
}

/// Ids are positions in the expanded submission
fn image_id(position: usize) -> Result<ImageId> {
    u32::try_from(position).map(ImageId).map_err(|_| {
        Error::IndexFault(format!(
            "file #{} is past the largest image id {}",
            position,
            u32::MAX
        ))
    })
}

/// Fingerprint every job and cluster the results. `Err` is a session fault.
fn process(
    session: &Session,
    jobs: Vec<Job>,
    config: &Config,
    index: Box<dyn SimilarityIndex>,
) -> Result<()> {
    let workers = config.effective_workers().min(jobs.len()).max(1);
    let (job_tx, job_rx) = channel::bounded::<Job>(config.queue_capacity);
    let (outcome_tx, outcome_rx) = channel::unbounded::<Outcome>();

    let decoder = Decoder::new(DecodeOptions {
        max_alloc: config.max_decode_alloc,
    });
    let mut clusterer = Clusterer::new(index, config.similarity_threshold);

    debug!(
        "Scan {}: {} job(s) on {} worker(s), queue capacity {}",
        session.id,
        jobs.len(),
        workers,
        config.queue_capacity
    );

    let collected = thread::scope(|scope| {
        scope.spawn(|| feed(session, jobs, job_tx));

        for n in 0..workers {
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let decoder = decoder.clone();
            let name = format!("scan-{}-worker-{}", session.id, n);
            scope.spawn(move || work(session, &name, decoder, config, job_rx, outcome_tx));
        }
        // Only workers hold these now, so either side can see the other go
        drop(job_rx);
        drop(outcome_tx);

        collect(session, &mut clusterer, outcome_rx)
    });

    collected?;

    let clusters = clusterer.clusters();
    session.update(|state| state.clusters = clusters);
    Ok(())
}

/// Push jobs into the bounded queue, stopping early on cancellation
fn feed(session: &Session, jobs: Vec<Job>, job_tx: Sender<Job>) {
    for job in jobs {
        if session.is_cancel_requested() {
            debug!("Scan {}: cancelled, no more files queued", session.id);
            break;
        }
        if job_tx.send(job).is_err() {
            break;
        }
    }
}

fn work(
    session: &Session,
    name: &str,
    decoder: Decoder,
    config: &Config,
    jobs: Receiver<Job>,
    outcomes: Sender<Outcome>,
) {
    let mut executor = TimedExecutor::with_stranded_limit(name, config.max_stranded_decodes);
    let timeout = config.decode_timeout();
    let algorithm = config.hash_algorithm;

    for job in jobs {
        // Checked between files only; a file already started runs to the end
        if session.is_cancel_requested() {
            continue;
        }

        let Job { id, blob } = job;
        let task_decoder = decoder.clone();
        let task_blob = blob.clone();
        let result = executor
            .run(timeout, move || {
                fingerprint_blob(&task_decoder, &task_blob, algorithm)
            })
            .unwrap_or_else(|e| Err(execution_error(&blob.name, timeout, e)));

        if outcomes.send(Outcome { id, result }).is_err() {
            break;
        }
    }
}

fn execution_error(name: &str, timeout: Duration, error: ExecutionError) -> Error {
    match error {
        // Saturated: earlier files are still stuck past their deadline
        ExecutionError::TimedOut(_) | ExecutionError::Saturated(_) => Error::DecodeTimeout {
            name: name.to_string(),
            timeout,
        },
        ExecutionError::Panicked(message) => {
            Error::CorruptData(format!("decoder panicked: {}", message))
        }
        ExecutionError::Spawn(e) => Error::Io(e),
    }
}

/// Single writer: feeds the clusterer and publishes progress
fn collect(session: &Session, clusterer: &mut Clusterer, outcomes: Receiver<Outcome>) -> Result<()> {
    for outcome in outcomes {
        let index = outcome.id.0 as usize;

        let added = match &outcome.result {
            Ok(hashes) => {
                let byte_size = session.state().records[index].byte_size;
                let entry = FingerprintEntry::new(outcome.id, hashes.perceptual, byte_size)
                    .with_digest(hashes.digest);
                clusterer.add(entry).map(|_| ())
            }
            Err(_) => Ok(()),
        };

        if let Err(fault) = added {
            // Nothing after a fault can be trusted; stop feeding and bail
            session.request_cancel();
            return Err(fault);
        }

        session.update(|state| {
            let record = &mut state.records[index];
            match &outcome.result {
                Ok(_) => record.decode_status = DecodeStatus::Decoded,
                Err(error) => mark_failed(record, error),
            }
            let name = record.source_name.clone();
            state.advance(&name);
        });
    }
    Ok(())
}

fn mark_failed(record: &mut ImageRecord, error: &Error) {
    let kind = error.failure_kind().unwrap_or(FailureKind::CorruptData);
    log_file_failure(&record.source_name, kind, error);

    record.decode_status = DecodeStatus::Failed;
    record.failure = Some(FailedFile {
        id: record.id,
        source_name: record.source_name.clone(),
        kind,
        message: error.to_string(),
    });
}
