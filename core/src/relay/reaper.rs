//! Liveness probing and garbage collection
//!
//! Three timers keep the registry honest: the heartbeat sweep pings
//! every live connection and terminates those that missed a cycle, the
//! cleanup sweep drops stale file records and idle empty pairs, and a
//! one-shot mint-TTL timer removes pairs that never fully bound.

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::{Role, ServerMessage};
use crate::relay::server::AppState;

pub(crate) fn spawn_heartbeat(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep_connections(&state).await;
        }
    })
}

pub(crate) fn spawn_cleanup(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep_sessions(&state).await;
        }
    })
}

/// Terminate connections that missed the previous ping cycle, then
/// clear the liveness flag and ping the rest. Pongs re-arm the flag.
pub(crate) async fn sweep_connections(state: &AppState) {
    for (pair_id, session) in state.registry.snapshot().await {
        let locked = session.lock().await;
        for role in Role::BOTH {
            if let Some(conn) = locked.slot(role) {
                if conn.take_alive() {
                    conn.ping();
                } else {
                    warn!(%pair_id, %role, "heartbeat missed, terminating connection");
                    conn.close("heartbeat timeout");
                }
            }
        }
    }
}

/// Remove file records idle past the cleanup timeout (completed records
/// linger the same period after completion) and evict empty pairs idle
/// past the pair timeout.
pub(crate) async fn sweep_sessions(state: &AppState) {
    for (pair_id, session) in state.registry.snapshot().await {
        let mut locked = session.lock().await;

        let timeout = state.config.file_cleanup_timeout;
        let before = locked.files.len();
        locked.files.retain(|_, record| record.idle_for() <= timeout);
        let removed = before - locked.files.len();
        if removed > 0 {
            debug!(%pair_id, removed, "removed stale file records");
        }

        if locked.is_unbound() && locked.idle_for() > state.config.pair_cleanup_timeout {
            state.registry.remove(&pair_id).await;
            info!(%pair_id, "removed idle pair");
        }
    }
}

/// Arm the mint TTL for a freshly minted pair: if it never becomes
/// fully bound, any sole connected side is told the pairing expired and
/// the session is removed.
pub(crate) fn spawn_mint_ttl(state: AppState, pair_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(state.config.mint_ttl).await;
        let Some(session) = state.registry.get(&pair_id).await else {
            return;
        };
        let locked = session.lock().await;
        if locked.ever_paired {
            return;
        }
        for role in Role::BOTH {
            if let Some(conn) = locked.slot(role) {
                conn.safe_send(ServerMessage::Expired);
                conn.close("pairing expired");
            }
        }
        state.registry.remove(&pair_id).await;
        info!(%pair_id, "removed pair that never fully bound");
    })
}
