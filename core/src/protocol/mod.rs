//! Wire protocol: message types, pairing credentials and constants

pub mod constants;
mod messages;
mod pairing;

pub use messages::{ChunkRef, ClientMessage, Role, ServerMessage};
pub use pairing::{generate_pair_id, generate_token, mint, PairCredentials};
