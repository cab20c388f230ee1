//! Pair session state
//!
//! One [`Session`] exists per pair identifier. It owns both role slots,
//! the clipboard history and all in-flight file records. Sessions are
//! only ever touched behind their per-session mutex, so slot binding,
//! received-set updates and status transitions observe consistent state.

pub mod registry;
pub mod transfer;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::protocol::constants::CLIPBOARD_HISTORY_LIMIT;
use crate::protocol::{Role, ServerMessage};
use transfer::{FileRecord, TransferStatus};

/// A clipboard event retained for replay to late-joining sides.
#[derive(Debug, Clone)]
pub struct ClipboardEntry {
    pub from: String,
    pub content: String,
    pub timestamp: u64,
}

/// Frames queued to a connection's writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    Frame(ServerMessage),
    Ping,
    Close(&'static str),
}

/// Result of a flow-controlled forward attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The outbox is full; the peer is transiently unavailable.
    Backpressure,
    /// The connection is gone.
    Closed,
}

/// Handle to one live connection, held in its session slot. The actual
/// socket stays with the connection driver; everything here is cheap to
/// clone and safe to use from any task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: u64,
    pub device_name: String,
    outbox: mpsc::Sender<OutboundFrame>,
    alive: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(
        conn_id: u64,
        device_name: String,
        outbox: mpsc::Sender<OutboundFrame>,
        alive: Arc<AtomicBool>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            conn_id,
            device_name,
            outbox,
            alive,
            shutdown,
        }
    }

    /// Queue a frame, dropping it silently if the peer is not writable.
    pub fn safe_send(&self, msg: ServerMessage) {
        if let Err(e) = self.outbox.try_send(OutboundFrame::Frame(msg)) {
            debug!(conn_id = self.conn_id, error = %e, "dropped outbound frame");
        }
    }

    /// Queue a frame and report the transport condition, for the chunk
    /// relay retry policy.
    pub fn try_forward(&self, msg: ServerMessage) -> SendOutcome {
        match self.outbox.try_send(OutboundFrame::Frame(msg)) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Backpressure,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }

    pub fn ping(&self) {
        let _ = self.outbox.try_send(OutboundFrame::Ping);
    }

    /// Queue a close frame and signal the driver to stop reading.
    pub fn close(&self, reason: &'static str) {
        let _ = self.outbox.try_send(OutboundFrame::Close(reason));
        let _ = self.shutdown.send(true);
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Read and clear the liveness flag in one step (heartbeat sweep).
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }
}

/// State for one pair of devices.
#[derive(Debug)]
pub struct Session {
    pub pair_id: String,
    pub token: String,
    /// Set once both slots have been bound simultaneously; after that
    /// the mint TTL no longer applies.
    pub ever_paired: bool,
    pc: Option<ConnectionHandle>,
    app: Option<ConnectionHandle>,
    pub clipboard_history: VecDeque<ClipboardEntry>,
    pub files: HashMap<String, FileRecord>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    pub fn new(pair_id: String, token: String) -> Self {
        let now = Instant::now();
        Self {
            pair_id,
            token,
            ever_paired: false,
            pc: None,
            app: None,
            clipboard_history: VecDeque::new(),
            files: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn slot(&self, role: Role) -> Option<&ConnectionHandle> {
        match role {
            Role::Pc => self.pc.as_ref(),
            Role::App => self.app.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<ConnectionHandle> {
        match role {
            Role::Pc => &mut self.pc,
            Role::App => &mut self.app,
        }
    }

    /// Bind a connection into its role slot, returning any displaced
    /// connection so the caller can close it with reason "replaced".
    pub fn bind(&mut self, role: Role, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.touch();
        self.slot_mut(role).replace(handle)
    }

    /// Release a slot, but only if it still holds the given connection.
    /// A driver that was displaced must not unbind its successor.
    pub fn unbind(&mut self, role: Role, conn_id: u64) -> Option<ConnectionHandle> {
        self.touch();
        let slot = self.slot_mut(role);
        if slot.as_ref().is_some_and(|h| h.conn_id == conn_id) {
            slot.take()
        } else {
            None
        }
    }

    pub fn is_fully_bound(&self) -> bool {
        self.pc.is_some() && self.app.is_some()
    }

    pub fn is_unbound(&self) -> bool {
        self.pc.is_none() && self.app.is_none()
    }

    /// Append a clipboard event, evicting the oldest entries beyond the
    /// retention limit.
    pub fn push_clipboard(&mut self, entry: ClipboardEntry) {
        self.clipboard_history.push_back(entry);
        while self.clipboard_history.len() > CLIPBOARD_HISTORY_LIMIT {
            self.clipboard_history.pop_front();
        }
    }

    /// Number of transfers in a non-terminal state.
    pub fn active_transfers(&self) -> usize {
        self.files
            .values()
            .filter(|rec| rec.status != TransferStatus::Completed)
            .count()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Milliseconds since the Unix epoch, for clipboard history timestamps.
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::protocol::constants::OUTBOX_CAPACITY;

    /// A connection handle wired to in-memory channels, plus the outbox
    /// receiver so tests can observe what the engine queued.
    pub fn handle(conn_id: u64, device_name: &str) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
        handle_with_capacity(conn_id, device_name, OUTBOX_CAPACITY)
    }

    pub fn handle_with_capacity(
        conn_id: u64,
        device_name: &str,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let handle = ConnectionHandle::new(
            conn_id,
            device_name.to_string(),
            tx,
            Arc::new(AtomicBool::new(true)),
            shutdown_tx,
        );
        (handle, rx)
    }

    /// Drain every queued protocol frame from an outbox receiver.
    pub fn drain_frames(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<ServerMessage> {
        let mut frames = Vec::new();
        while let Ok(out) = rx.try_recv() {
            if let OutboundFrame::Frame(msg) = out {
                frames.push(msg);
            }
        }
        frames
    }
}
