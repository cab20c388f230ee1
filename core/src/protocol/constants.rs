//! Centralized protocol constants
//!
//! All protocol-level defaults and limits are defined here to ensure
//! consistency across the codebase and make configuration easier.

use std::time::Duration;

/// Default TCP port for the relay server
pub const DEFAULT_PORT: u16 = 5050;

/// Default chunk size in bytes, used to estimate file sizes when the
/// sender does not announce `totalSize` (64 KiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Default maximum accepted file size (5 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default maximum number of concurrently active transfers per pair
pub const DEFAULT_MAX_SIMULTANEOUS_FILES: usize = 5;

/// Default number of relay attempts per chunk before the transfer pauses
pub const DEFAULT_CHUNK_RETRY_LIMIT: u32 = 3;

/// Backoff unit between chunk relay attempts (linear: unit x attempt number)
pub const CHUNK_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default idle timeout after which a file record is removed (30 min)
pub const DEFAULT_FILE_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default idle timeout after which an empty pair is removed (12 h)
pub const DEFAULT_PAIR_CLEANUP_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Default interval between heartbeat ping sweeps
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period for a freshly minted pair to bind both sides
pub const DEFAULT_MINT_TTL: Duration = Duration::from_secs(2 * 60);

/// Interval between file/session cleanup sweeps
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Number of clipboard entries retained per pair for replay
pub const CLIPBOARD_HISTORY_LIMIT: usize = 50;

/// Random bytes in a pair identifier (hex-encoded to 6 characters)
pub const PAIR_ID_BYTES: usize = 3;

/// Random bytes in a bearer token (hex-encoded to 32 characters)
pub const TOKEN_BYTES: usize = 16;

/// Outbound frame queue depth per connection. A full queue is treated as
/// transport backpressure by the chunk relay retry policy.
pub const OUTBOX_CAPACITY: usize = 256;
