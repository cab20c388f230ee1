//! Protocol message definitions
//!
//! Every frame on the wire is a UTF-8 JSON object with a `type` field.
//! Client frames and server frames are modelled as two tagged enums so
//! dispatch happens on typed variants rather than raw JSON; a frame that
//! fails to match the schema is dropped by the connection driver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which side of a pair a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pc,
    App,
}

impl Role {
    pub const BOTH: [Role; 2] = [Role::Pc, Role::App];

    /// The opposite side of the pair.
    pub fn other(self) -> Role {
        match self {
            Role::Pc => Role::App,
            Role::App => Role::Pc,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Pc => write!(f, "pc"),
            Role::App => write!(f, "app"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pc" => Ok(Role::Pc),
            "app" => Ok(Role::App),
            other => Err(Error::InvalidMessage(format!("unknown role: {other}"))),
        }
    }
}

/// Frames accepted from clients after the upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Clipboard text captured on the sending device.
    Clipboard { content: String },

    /// Announces a new file transfer; the announcing side becomes the
    /// sender for this `fileId`.
    FileMeta {
        file_id: String,
        file_name: String,
        /// Signed so a non-positive value reaches validation instead of
        /// being rejected at the schema layer.
        total_chunks: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_size: Option<u64>,
    },

    /// One base64-encoded chunk of file data.
    FileChunk {
        file_id: String,
        chunk_index: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_chunks: Option<u64>,
        data: String,
    },

    /// Receiver acknowledgement for a delivered chunk.
    FileChunkAck { file_id: String, chunk_index: u64 },

    /// Sender-side completion notice (informational; completion is
    /// driven by acknowledgements).
    FileComplete { file_id: String },

    PauseFile { file_id: String },

    ResumeFile { file_id: String },

    /// Receiver asks the sender to re-emit specific chunk indices.
    RequestChunks { file_id: String, chunks: Vec<u64> },

    /// Sender answers a missing-chunks request. Elements carrying data
    /// are relayed; bare indices are ignored.
    FileMissingChunks {
        file_id: String,
        chunks: Vec<ChunkRef>,
    },

    /// Any `type` this server does not know. Logged and dropped.
    #[serde(other)]
    Unknown,
}

/// An element of a sender-supplied `chunks` array: either a bare index
/// or a full chunk payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkRef {
    Index(u64),
    Chunk {
        #[serde(rename = "chunkIndex")]
        chunk_index: u64,
        data: String,
    },
}

/// Frames emitted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Status { message: String },

    Error { message: String },

    /// The pair was never fully bound within the mint TTL.
    Expired,

    PeerDisconnected { side: Role, message: String },

    Clipboard { from: String, content: String },

    FileMeta {
        file_id: String,
        file_name: String,
        total_chunks: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_size: Option<u64>,
    },

    FileChunk {
        file_id: String,
        chunk_index: u64,
        total_chunks: u64,
        data: String,
    },

    FileChunkAck { file_id: String, chunk_index: u64 },

    FileProgress {
        file_id: String,
        received_chunks: u64,
        total_chunks: u64,
    },

    FileComplete { file_id: String },

    FilePaused {
        file_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    FileResumed { file_id: String },

    FileMissingChunks { file_id: String, chunks: Vec<u64> },
}
