//! Per-file transfer records
//!
//! The server never sees file bytes as a whole; it accounts for which
//! chunk indices the receiver has acknowledged. That set is the single
//! source of truth for progress, completion and missing-chunk recovery.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::protocol::Role;

/// Transfer lifecycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Sending,
    Paused,
    Completed,
}

/// State kept per in-flight file, keyed by the client-supplied `fileId`.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_name: String,
    pub total_chunks: u64,
    pub total_size: Option<u64>,
    /// The role that announced the file via `file_meta`.
    pub sender: Role,
    /// Chunk indices the receiver has acknowledged.
    received: BTreeSet<u64>,
    pub status: TransferStatus,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl FileRecord {
    pub fn new(file_name: String, total_chunks: u64, total_size: Option<u64>, sender: Role) -> Self {
        let now = Instant::now();
        Self {
            file_name,
            total_chunks,
            total_size,
            sender,
            received: BTreeSet::new(),
            status: TransferStatus::Sending,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record an acknowledged chunk. Returns `false` for duplicates and
    /// out-of-range indices.
    pub fn mark_received(&mut self, chunk_index: u64) -> bool {
        if chunk_index >= self.total_chunks {
            return false;
        }
        self.received.insert(chunk_index)
    }

    pub fn is_received(&self, chunk_index: u64) -> bool {
        self.received.contains(&chunk_index)
    }

    pub fn received_chunks(&self) -> u64 {
        self.received.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks() == self.total_chunks
    }

    /// Indices in `0..totalChunks` the receiver has not acknowledged,
    /// in ascending order.
    pub fn missing_chunks(&self) -> Vec<u64> {
        (0..self.total_chunks)
            .filter(|i| !self.received.contains(i))
            .collect()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
