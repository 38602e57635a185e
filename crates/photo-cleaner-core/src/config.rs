use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::index::IndexKind;
use crate::processing::HashAlgorithm;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for a duplicate scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Perceptual hash family used to fingerprint images
    pub hash_algorithm: HashAlgorithm,

    /// Maximum Hamming distance (in bits, 0-64) for two images to be linked
    pub similarity_threshold: u32,

    /// Which similarity index backs the scan
    pub index_kind: IndexKind,

    /// Number of chunks a fingerprint is split into by the bucketed index
    pub index_segments: u32,

    /// Number of decode workers (0 = auto)
    pub workers: usize,

    /// Capacity of the bounded job queue feeding the workers
    pub queue_capacity: usize,

    /// Per-file decode and hash timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Maximum nesting depth for zip archives
    pub max_archive_depth: usize,

    /// Most entries taken from one submitted archive, nested ones included
    pub max_archive_entries: usize,

    /// Most uncompressed bytes taken from one submitted archive
    pub max_archive_bytes: u64,

    /// Upper bound on bytes the image decoder may allocate for one file
    pub max_decode_alloc: u64,

    /// Timed-out decodes a worker may leave running before it stops
    /// accepting new files
    pub max_stranded_decodes: usize,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Phash,
            similarity_threshold: 10,
            index_kind: IndexKind::Linear,
            index_segments: 8,
            workers: 0, // Auto
            queue_capacity: 64,
            decode_timeout_ms: 10_000,
            max_archive_depth: 5,
            max_archive_entries: 10_000,
            max_archive_bytes: 2 * 1024 * 1024 * 1024,
            max_decode_alloc: 512 * 1024 * 1024,
            max_stranded_decodes: 4,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.similarity_threshold > 64 {
            return Err(Error::Configuration(
                "Similarity threshold must be between 0 and 64 bits".to_string(),
            ));
        }

        if self.index_segments == 0 || 64 % self.index_segments != 0 {
            return Err(Error::Configuration(format!(
                "Index segments must divide 64, got {}",
                self.index_segments
            )));
        }

        if self.queue_capacity == 0 {
            return Err(Error::Configuration(
                "Queue capacity must be at least 1".to_string(),
            ));
        }

        if self.decode_timeout_ms == 0 {
            return Err(Error::Configuration(
                "Decode timeout must be greater than zero".to_string(),
            ));
        }

        if self.max_archive_depth == 0 {
            return Err(Error::Configuration(
                "Archive depth limit must be at least 1".to_string(),
            ));
        }

        if self.max_archive_entries == 0 || self.max_archive_bytes == 0 {
            return Err(Error::Configuration(
                "Archive entry and byte budgets must be greater than zero".to_string(),
            ));
        }

        if self.max_stranded_decodes == 0 {
            return Err(Error::Configuration(
                "At least one stranded decode must be allowed per worker".to_string(),
            ));
        }

        Ok(())
    }

    /// Worker count with `0` resolved to the number of CPUs
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}
