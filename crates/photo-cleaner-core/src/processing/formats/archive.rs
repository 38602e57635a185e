//! Zip expansion.
//!
//! Archives are flattened into their image entries before any decoding
//! happens. Nested archives are followed up to a depth limit; an entry
//! past the limit, or one that cannot be read, is reported on its own
//! without affecting its siblings.

use std::io::{Cursor, Read};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{ImageFormat, InputBlob};

/// Result of expanding one submitted blob
#[derive(Debug)]
pub enum ExpandedEntry {
    /// A leaf blob ready for decoding
    Blob(InputBlob),

    /// An archive or archive entry that could not be expanded
    Failed {
        name: String,
        byte_size: u64,
        error: Error,
    },
}

impl ExpandedEntry {
    pub fn name(&self) -> &str {
        match self {
            ExpandedEntry::Blob(blob) => &blob.name,
            ExpandedEntry::Failed { name, .. } => name,
        }
    }
}

/// Limits applied while expanding archives
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    /// Deepest archive nesting accepted; the outermost archive is depth 1
    pub max_depth: usize,

    /// Largest uncompressed entry accepted, in bytes
    pub max_entry_size: u64,

    /// Most entries taken from one outermost archive, nested entries included
    pub max_entries: usize,

    /// Most uncompressed bytes taken from one outermost archive
    pub max_total_bytes: u64,
}

/// What is left of an outermost archive's allowance
struct Budget {
    entries_left: usize,
    bytes_left: u64,
}

impl Budget {
    fn new(limits: &ArchiveLimits) -> Self {
        Self {
            entries_left: limits.max_entries,
            bytes_left: limits.max_total_bytes,
        }
    }
}

/// Expand every zip among `blobs` into its leaf entries, in submission order.
///
/// Entries past an archive's budget are reported as `ArchiveTooLarge`
/// without being inflated.
pub fn expand_archives(blobs: Vec<InputBlob>, limits: ArchiveLimits) -> Vec<ExpandedEntry> {
    let mut entries = Vec::with_capacity(blobs.len());
    for blob in blobs {
        if ImageFormat::from_bytes(&blob.bytes) == ImageFormat::Zip {
            let mut budget = Budget::new(&limits);
            expand_zip(blob, 1, limits, &mut budget, &mut entries);
        } else {
            entries.push(ExpandedEntry::Blob(blob));
        }
    }
    entries
}

fn expand_zip(
    blob: InputBlob,
    depth: usize,
    limits: ArchiveLimits,
    budget: &mut Budget,
    out: &mut Vec<ExpandedEntry>,
) {
    if depth > limits.max_depth {
        warn!("Rejecting {}: archive nesting exceeds {}", blob.name, limits.max_depth);
        out.push(ExpandedEntry::Failed {
            byte_size: blob.byte_size(),
            error: Error::ArchiveTooDeep {
                name: blob.name.clone(),
                limit: limits.max_depth,
            },
            name: blob.name,
        });
        return;
    }

    let mut archive = match zip::ZipArchive::new(Cursor::new(&blob.bytes[..])) {
        Ok(archive) => archive,
        Err(e) => {
            out.push(ExpandedEntry::Failed {
                name: blob.name.clone(),
                byte_size: blob.byte_size(),
                error: e.into(),
            });
            return;
        }
    };

    debug!("Expanding {} ({} entries, depth {})", blob.name, archive.len(), depth);

    for index in 0..archive.len() {
        match read_entry(&mut archive, &blob.name, index, &limits, budget) {
            Ok(None) => {}
            Ok(Some((name, bytes))) => {
                let child = InputBlob::new(name, bytes);
                if ImageFormat::from_bytes(&child.bytes) == ImageFormat::Zip {
                    expand_zip(child, depth + 1, limits, budget, out);
                } else {
                    out.push(ExpandedEntry::Blob(child));
                }
            }
            Err((name, error)) => {
                out.push(ExpandedEntry::Failed {
                    name,
                    byte_size: 0,
                    error,
                });
            }
        }
    }
}

/// Read one entry, charging it to `budget`. Directories yield `Ok(None)`.
/// Both outcomes carry the entry's full `archive/entry` name.
fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    archive_name: &str,
    index: usize,
    limits: &ArchiveLimits,
    budget: &mut Budget,
) -> std::result::Result<Option<(String, Vec<u8>)>, (String, Error)> {
    let mut file = archive.by_index(index).map_err(|e| {
        (
            format!("{}/entry {}", archive_name, index),
            Error::from(e),
        )
    })?;

    if file.is_dir() {
        return Ok(None);
    }

    let name = format!("{}/{}", archive_name, file.name());
    let too_large = |name: &str, reason: String| Error::ArchiveTooLarge {
        name: name.to_string(),
        reason,
    };

    if budget.entries_left == 0 {
        let error = too_large(&name, format!("more than {} entries", limits.max_entries));
        return Err((name, error));
    }
    budget.entries_left -= 1;

    let cap = limits.max_entry_size.min(budget.bytes_left);
    let bytes = match read_limited(&mut file, cap) {
        Ok(Some(bytes)) => bytes,
        Ok(None) if cap < limits.max_entry_size => {
            let error = too_large(
                &name,
                format!("more than {} bytes inflated", limits.max_total_bytes),
            );
            return Err((name, error));
        }
        Ok(None) => {
            let error = Error::CorruptData(format!(
                "entry inflates past {} bytes",
                limits.max_entry_size
            ));
            return Err((name, error));
        }
        Err(e) => return Err((name, e)),
    };

    budget.bytes_left -= bytes.len() as u64;
    Ok(Some((name, bytes)))
}

/// Read at most `max_size` bytes; `None` if there was more
fn read_limited<R: Read>(reader: &mut R, max_size: u64) -> Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader
        .take(max_size.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| Error::CorruptData(format!("failed to inflate entry: {}", e)))?;

    if bytes.len() as u64 > max_size {
        return Ok(None);
    }
    Ok(Some(bytes))
}
