//! Pairing credential mint
//!
//! A pair is born as `{pairId, token}`: 3 random bytes hex-encoded for
//! the identifier, 16 random bytes hex-encoded for the one-time bearer
//! token. Both are opaque to clients.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::constants::{PAIR_ID_BYTES, TOKEN_BYTES};

/// Credentials returned by `GET /pair`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCredentials {
    pub pair_id: String,
    pub token: String,
}

/// Mint fresh pair credentials. Generation cannot fail; identifier
/// collisions against live sessions are the caller's concern.
pub fn mint() -> PairCredentials {
    PairCredentials {
        pair_id: generate_pair_id(),
        token: generate_token(),
    }
}

/// 6 lowercase hex characters.
pub fn generate_pair_id() -> String {
    random_hex(PAIR_ID_BYTES)
}

/// 32 lowercase hex characters.
pub fn generate_token() -> String {
    random_hex(TOKEN_BYTES)
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
