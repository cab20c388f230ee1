//! ClipSync Core - clipboard and file relay between paired devices
//!
//! This library implements the relay server that lets a desktop ("pc")
//! and a mobile ("app") pair over the Internet and exchange clipboard
//! text and chunked binary files. The server never persists payloads:
//! it mints short-lived pairing credentials, authenticates both sides
//! onto the same session, forwards frames between them and keeps just
//! enough per-transfer state for pause/resume and chunk recovery.

pub mod protocol;
pub mod relay;
pub mod session;

mod error;

pub use error::{Error, Result};
pub use relay::server::{router, serve, serve_on, AppState};

use std::str::FromStr;
use std::time::Duration;

use protocol::constants;

/// Runtime configuration for the relay.
///
/// [`Config::from_env`] reads the documented environment variables;
/// timeout values are given in seconds. Unset or unparseable variables
/// fall back to the defaults in [`protocol::constants`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (`PORT`).
    pub port: u16,
    /// Chunk size in bytes used for size estimation (`CHUNK_SIZE`).
    pub chunk_size: u64,
    /// Maximum accepted file size in bytes (`MAX_FILE_SIZE`).
    pub max_file_size: u64,
    /// Cap on concurrently active transfers per pair
    /// (`MAX_SIMULTANEOUS_FILES`).
    pub max_simultaneous_files: usize,
    /// Relay attempts per chunk before pausing (`CHUNK_RETRY_LIMIT`).
    pub chunk_retry_limit: u32,
    /// Idle timeout for file records (`FILE_CLEANUP_TIMEOUT`, seconds).
    pub file_cleanup_timeout: Duration,
    /// Idle timeout for empty pairs (`PAIR_CLEANUP_TIMEOUT`, seconds).
    pub pair_cleanup_timeout: Duration,
    /// Heartbeat sweep interval (`HEARTBEAT_INTERVAL`, seconds).
    pub heartbeat_interval: Duration,
    /// Grace period for a minted pair to bind both sides.
    pub mint_ttl: Duration,
    /// Interval between cleanup sweeps.
    pub cleanup_interval: Duration,
    /// Verbose logging (`DEBUG` set to `1` or `true`).
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_PORT,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            max_file_size: constants::DEFAULT_MAX_FILE_SIZE,
            max_simultaneous_files: constants::DEFAULT_MAX_SIMULTANEOUS_FILES,
            chunk_retry_limit: constants::DEFAULT_CHUNK_RETRY_LIMIT,
            file_cleanup_timeout: constants::DEFAULT_FILE_CLEANUP_TIMEOUT,
            pair_cleanup_timeout: constants::DEFAULT_PAIR_CLEANUP_TIMEOUT,
            heartbeat_interval: constants::DEFAULT_HEARTBEAT_INTERVAL,
            mint_ttl: constants::DEFAULT_MINT_TTL,
            cleanup_interval: constants::DEFAULT_CLEANUP_INTERVAL,
            debug: false,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse("PORT") {
            config.port = port;
        }
        if let Some(chunk_size) = env_parse("CHUNK_SIZE") {
            config.chunk_size = chunk_size;
        }
        if let Some(max_file_size) = env_parse("MAX_FILE_SIZE") {
            config.max_file_size = max_file_size;
        }
        if let Some(max_files) = env_parse("MAX_SIMULTANEOUS_FILES") {
            config.max_simultaneous_files = max_files;
        }
        if let Some(retry_limit) = env_parse("CHUNK_RETRY_LIMIT") {
            config.chunk_retry_limit = retry_limit;
        }
        if let Some(secs) = env_parse::<u64>("FILE_CLEANUP_TIMEOUT") {
            config.file_cleanup_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("PAIR_CLEANUP_TIMEOUT") {
            config.pair_cleanup_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("HEARTBEAT_INTERVAL") {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        config.debug = std::env::var("DEBUG")
            .map(|v| {
                let v = v.trim();
                v == "1" || v.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false);

        config
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}
