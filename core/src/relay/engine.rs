//! Clipboard relay and file-transfer engine
//!
//! Frame handlers operate on a locked [`Session`] and queue outbound
//! frames onto peer connection handles. Acknowledgements observed here
//! are the single source of truth for transfer progress: the server
//! never marks a chunk received on forward, only on the receiver's ack,
//! which is what makes disconnect recovery cost exactly the
//! unacknowledged chunks.

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::protocol::constants::CHUNK_RETRY_BACKOFF;
use crate::protocol::{ChunkRef, ClientMessage, Role, ServerMessage};
use crate::session::transfer::{FileRecord, TransferStatus};
use crate::session::{unix_ms, ClipboardEntry, SendOutcome, Session};
use crate::Config;

/// Dispatch one parsed client frame.
pub async fn dispatch(session: &mut Session, from: Role, msg: ClientMessage, config: &Config) {
    session.touch();
    match msg {
        ClientMessage::Clipboard { content } => handle_clipboard(session, from, content),
        ClientMessage::FileMeta {
            file_id,
            file_name,
            total_chunks,
            total_size,
        } => handle_file_meta(session, from, file_id, file_name, total_chunks, total_size, config),
        ClientMessage::FileChunk {
            file_id,
            chunk_index,
            data,
            ..
        } => relay_chunk(session, &file_id, chunk_index, data, config).await,
        ClientMessage::FileChunkAck {
            file_id,
            chunk_index,
        } => handle_file_chunk_ack(session, file_id, chunk_index),
        ClientMessage::FileComplete { file_id } => handle_file_complete(session, from, file_id),
        ClientMessage::PauseFile { file_id } => handle_pause_file(session, &file_id),
        ClientMessage::ResumeFile { file_id } => handle_resume_file(session, &file_id),
        ClientMessage::RequestChunks { file_id, chunks } => {
            handle_request_chunks(session, &file_id, chunks)
        }
        ClientMessage::FileMissingChunks { file_id, chunks } => {
            handle_missing_chunks(session, &file_id, chunks, config).await
        }
        ClientMessage::Unknown => debug!("ignoring frame with unknown type"),
    }
}

/// Runs after a connection has been bound into its slot: greets the new
/// side, replays clipboard history and transfer state, announces the
/// pairing when both sides are present and auto-resumes paused files.
pub fn on_bind(session: &mut Session, role: Role) {
    let Some(conn) = session.slot(role).cloned() else {
        return;
    };

    conn.safe_send(ServerMessage::Status {
        message: format!("{role} registered."),
    });

    for entry in &session.clipboard_history {
        conn.safe_send(ServerMessage::Clipboard {
            from: entry.from.clone(),
            content: entry.content.clone(),
        });
    }

    for (file_id, record) in &session.files {
        if record.status == TransferStatus::Completed {
            continue;
        }
        if record.sender == role {
            conn.safe_send(ServerMessage::FileProgress {
                file_id: file_id.clone(),
                received_chunks: record.received_chunks(),
                total_chunks: record.total_chunks,
            });
        } else {
            conn.safe_send(ServerMessage::FileMeta {
                file_id: file_id.clone(),
                file_name: record.file_name.clone(),
                total_chunks: record.total_chunks,
                total_size: record.total_size,
            });
        }
    }

    if session.is_fully_bound() {
        session.ever_paired = true;
        if let Some(pc) = session.slot(Role::Pc) {
            pc.safe_send(ServerMessage::Status {
                message: "Mobile connected".to_string(),
            });
        }
        if let Some(app) = session.slot(Role::App) {
            app.safe_send(ServerMessage::Status {
                message: "PC connected".to_string(),
            });
        }
    }

    // Reconnect auto-resume: flip paused transfers back to sending and
    // hand the sender the exact set of unacknowledged chunks.
    let mut resumed = Vec::new();
    for (file_id, record) in session.files.iter_mut() {
        if record.status == TransferStatus::Paused {
            record.status = TransferStatus::Sending;
            record.touch();
            resumed.push((file_id.clone(), record.sender, record.missing_chunks()));
        }
    }
    for (file_id, sender_role, missing) in resumed {
        if let Some(sender) = session.slot(sender_role) {
            sender.safe_send(ServerMessage::FileMissingChunks {
                file_id,
                chunks: missing,
            });
        }
    }
}

/// Runs after a slot has been released by its own driver: tells the
/// remaining peer and pauses transfers this side was sending.
pub fn on_disconnect(session: &mut Session, role: Role, device_name: &str) {
    session.touch();

    if let Some(peer) = session.slot(role.other()) {
        peer.safe_send(ServerMessage::PeerDisconnected {
            side: role,
            message: format!("{device_name} disconnected"),
        });
    }

    let mut paused = Vec::new();
    for (file_id, record) in session.files.iter_mut() {
        if record.sender == role && record.status == TransferStatus::Sending {
            record.status = TransferStatus::Paused;
            record.touch();
            paused.push(file_id.clone());
        }
    }
    for file_id in paused {
        broadcast(
            session,
            ServerMessage::FilePaused {
                file_id,
                reason: Some("Sender disconnected".to_string()),
            },
        );
    }
}

fn handle_clipboard(session: &mut Session, from: Role, content: String) {
    let device_name = session
        .slot(from)
        .map(|h| h.device_name.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    session.push_clipboard(ClipboardEntry {
        from: device_name.clone(),
        content: content.clone(),
        timestamp: unix_ms(),
    });

    if let Some(peer) = session.slot(from.other()) {
        peer.safe_send(ServerMessage::Clipboard {
            from: device_name,
            content,
        });
    }
}

fn handle_file_meta(
    session: &mut Session,
    from: Role,
    file_id: String,
    file_name: String,
    total_chunks: i64,
    total_size: Option<u64>,
    config: &Config,
) {
    if file_id.is_empty() || file_name.is_empty() || total_chunks <= 0 {
        reply_error(session, from, "Invalid file meta".to_string());
        return;
    }
    if session.active_transfers() >= config.max_simultaneous_files {
        reply_error(
            session,
            from,
            format!(
                "Too many simultaneous file transfers. Maximum is {}",
                config.max_simultaneous_files
            ),
        );
        return;
    }

    let total_chunks = total_chunks as u64;
    let effective_size = total_size.unwrap_or_else(|| total_chunks.saturating_mul(config.chunk_size));
    if effective_size > config.max_file_size {
        reply_error(
            session,
            from,
            format!(
                "File too large. Maximum size is {}MB",
                config.max_file_size / (1024 * 1024)
            ),
        );
        return;
    }

    session.files.insert(
        file_id.clone(),
        FileRecord::new(file_name.clone(), total_chunks, total_size, from),
    );
    debug!(file_id, total_chunks, "transfer announced");

    if let Some(peer) = session.slot(from.other()) {
        peer.safe_send(ServerMessage::FileMeta {
            file_id,
            file_name,
            total_chunks,
            total_size,
        });
    }
}

/// Forward one chunk to the receiver with retry and duplicate
/// suppression. Also the delivery path for re-sent chunks arriving
/// inside a sender's `file_missing_chunks` answer.
async fn relay_chunk(
    session: &mut Session,
    file_id: &str,
    chunk_index: u64,
    data: String,
    config: &Config,
) {
    let (receiver_role, total_chunks) = {
        let Some(record) = session.files.get_mut(file_id) else {
            debug!(file_id, "chunk for unknown file dropped");
            return;
        };
        if record.status == TransferStatus::Paused {
            return;
        }
        record.touch();
        (record.sender.other(), record.total_chunks)
    };

    let receiver = match session.slot(receiver_role) {
        Some(conn) if conn.is_open() => conn.clone(),
        _ => {
            pause_with_reason(session, file_id, "Receiver unavailable");
            return;
        }
    };

    if session
        .files
        .get(file_id)
        .is_some_and(|record| record.is_received(chunk_index))
    {
        debug!(file_id, chunk_index, "duplicate chunk dropped");
        return;
    }

    let frame = ServerMessage::FileChunk {
        file_id: file_id.to_string(),
        chunk_index,
        total_chunks,
        data,
    };

    for attempt in 1..=config.chunk_retry_limit {
        match receiver.try_forward(frame.clone()) {
            SendOutcome::Sent => return,
            SendOutcome::Closed => {
                pause_with_reason(session, file_id, "Receiver unavailable");
                return;
            }
            SendOutcome::Backpressure => {
                if attempt < config.chunk_retry_limit {
                    sleep(CHUNK_RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    warn!(file_id, chunk_index, "chunk relay exhausted retries");
    pause_with_reason(session, file_id, "Relay failed");
}

fn handle_file_chunk_ack(session: &mut Session, file_id: String, chunk_index: u64) {
    let Some(record) = session.files.get_mut(&file_id) else {
        return;
    };
    record.mark_received(chunk_index);
    record.touch();

    let sender_role = record.sender;
    let received_chunks = record.received_chunks();
    let total_chunks = record.total_chunks;
    let completed_now = record.status != TransferStatus::Completed && record.is_complete();
    if completed_now {
        record.status = TransferStatus::Completed;
    }

    if let Some(sender) = session.slot(sender_role) {
        sender.safe_send(ServerMessage::FileChunkAck {
            file_id: file_id.clone(),
            chunk_index,
        });
    }
    if let Some(receiver) = session.slot(sender_role.other()) {
        receiver.safe_send(ServerMessage::FileProgress {
            file_id: file_id.clone(),
            received_chunks,
            total_chunks,
        });
    }

    if completed_now {
        debug!(file_id, "transfer completed");
        broadcast(session, ServerMessage::FileComplete { file_id });
    }
}

fn handle_file_complete(session: &mut Session, from: Role, file_id: String) {
    // Informational; authoritative completion is driven by acks.
    if let Some(peer) = session.slot(from.other()) {
        peer.safe_send(ServerMessage::FileComplete { file_id });
    }
}

fn handle_pause_file(session: &mut Session, file_id: &str) {
    let Some(record) = session.files.get_mut(file_id) else {
        return;
    };
    if record.status == TransferStatus::Completed {
        return;
    }
    record.status = TransferStatus::Paused;
    record.touch();
    broadcast(
        session,
        ServerMessage::FilePaused {
            file_id: file_id.to_string(),
            reason: None,
        },
    );
}

fn handle_resume_file(session: &mut Session, file_id: &str) {
    let (sender_role, missing) = {
        let Some(record) = session.files.get_mut(file_id) else {
            return;
        };
        if record.status == TransferStatus::Completed {
            return;
        }
        record.status = TransferStatus::Sending;
        record.touch();
        (record.sender, record.missing_chunks())
    };

    broadcast(
        session,
        ServerMessage::FileResumed {
            file_id: file_id.to_string(),
        },
    );
    if let Some(sender) = session.slot(sender_role) {
        sender.safe_send(ServerMessage::FileMissingChunks {
            file_id: file_id.to_string(),
            chunks: missing,
        });
    }
}

fn handle_request_chunks(session: &mut Session, file_id: &str, chunks: Vec<u64>) {
    let Some(record) = session.files.get(file_id) else {
        return;
    };
    let sender_role = record.sender;
    if let Some(sender) = session.slot(sender_role) {
        sender.safe_send(ServerMessage::FileMissingChunks {
            file_id: file_id.to_string(),
            chunks,
        });
    }
}

async fn handle_missing_chunks(
    session: &mut Session,
    file_id: &str,
    chunks: Vec<ChunkRef>,
    config: &Config,
) {
    for entry in chunks {
        match entry {
            ChunkRef::Chunk { chunk_index, data } => {
                relay_chunk(session, file_id, chunk_index, data, config).await;
            }
            // Bare indices: the sender follows up with ordinary
            // file_chunk frames for these.
            ChunkRef::Index(_) => {}
        }
    }
}

fn pause_with_reason(session: &mut Session, file_id: &str, reason: &str) {
    {
        let Some(record) = session.files.get_mut(file_id) else {
            return;
        };
        if record.status == TransferStatus::Completed {
            return;
        }
        record.status = TransferStatus::Paused;
        record.touch();
    }
    broadcast(
        session,
        ServerMessage::FilePaused {
            file_id: file_id.to_string(),
            reason: Some(reason.to_string()),
        },
    );
}

fn broadcast(session: &Session, msg: ServerMessage) {
    for role in Role::BOTH {
        if let Some(conn) = session.slot(role) {
            conn.safe_send(msg.clone());
        }
    }
}

fn reply_error(session: &Session, to: Role, message: String) {
    if let Some(conn) = session.slot(to) {
        conn.safe_send(ServerMessage::Error { message });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::testing::{drain_frames, handle, handle_with_capacity};
    use crate::session::OutboundFrame;

    struct Pair {
        session: Session,
        pc_rx: mpsc::Receiver<OutboundFrame>,
        app_rx: mpsc::Receiver<OutboundFrame>,
    }

    /// Session with both sides bound directly (no on_bind greetings), so
    /// tests observe only the frames the exercised handler produces.
    fn bound_pair() -> Pair {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        let (pc, pc_rx) = handle(1, "Desktop");
        let (app, app_rx) = handle(2, "Phone");
        session.bind(Role::Pc, pc);
        session.bind(Role::App, app);
        Pair {
            session,
            pc_rx,
            app_rx,
        }
    }

    fn meta(file_id: &str, total_chunks: i64) -> ClientMessage {
        ClientMessage::FileMeta {
            file_id: file_id.to_string(),
            file_name: format!("{file_id}.bin"),
            total_chunks,
            total_size: None,
        }
    }

    fn chunk(file_id: &str, chunk_index: u64) -> ClientMessage {
        ClientMessage::FileChunk {
            file_id: file_id.to_string(),
            chunk_index,
            total_chunks: Some(3),
            data: "QUJDREVG".to_string(),
        }
    }

    fn ack(file_id: &str, chunk_index: u64) -> ClientMessage {
        ClientMessage::FileChunkAck {
            file_id: file_id.to_string(),
            chunk_index,
        }
    }

    #[tokio::test]
    async fn test_clipboard_forwards_with_device_name_and_records_history() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(
            &mut pair.session,
            Role::Pc,
            ClientMessage::Clipboard {
                content: "hello".to_string(),
            },
            &config,
        )
        .await;

        let app_frames = drain_frames(&mut pair.app_rx);
        assert_eq!(
            app_frames,
            vec![ServerMessage::Clipboard {
                from: "Desktop".to_string(),
                content: "hello".to_string(),
            }]
        );
        assert!(drain_frames(&mut pair.pc_rx).is_empty());
        assert_eq!(pair.session.clipboard_history.len(), 1);
        assert_eq!(pair.session.clipboard_history[0].from, "Desktop");
    }

    #[tokio::test]
    async fn test_clipboard_without_peer_still_records_history() {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        let (pc, mut pc_rx) = handle(1, "Desktop");
        session.bind(Role::Pc, pc);

        dispatch(
            &mut session,
            Role::Pc,
            ClientMessage::Clipboard {
                content: "solo".to_string(),
            },
            &Config::default(),
        )
        .await;

        assert_eq!(session.clipboard_history.len(), 1);
        assert!(drain_frames(&mut pc_rx).is_empty());
    }

    #[tokio::test]
    async fn test_on_bind_greets_and_replays_history_in_order() {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        session.push_clipboard(ClipboardEntry {
            from: "Desktop".to_string(),
            content: "a".to_string(),
            timestamp: 1,
        });
        session.push_clipboard(ClipboardEntry {
            from: "Desktop".to_string(),
            content: "b".to_string(),
            timestamp: 2,
        });

        let (app, mut app_rx) = handle(1, "Phone");
        session.bind(Role::App, app);
        on_bind(&mut session, Role::App);

        let frames = drain_frames(&mut app_rx);
        assert_eq!(
            frames,
            vec![
                ServerMessage::Status {
                    message: "app registered.".to_string()
                },
                ServerMessage::Clipboard {
                    from: "Desktop".to_string(),
                    content: "a".to_string()
                },
                ServerMessage::Clipboard {
                    from: "Desktop".to_string(),
                    content: "b".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_on_bind_announces_pairing_to_both_sides() {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        let (pc, mut pc_rx) = handle(1, "Desktop");
        let (app, mut app_rx) = handle(2, "Phone");
        session.bind(Role::Pc, pc);
        on_bind(&mut session, Role::Pc);
        drain_frames(&mut pc_rx);

        session.bind(Role::App, app);
        on_bind(&mut session, Role::App);

        assert!(session.ever_paired);
        assert_eq!(
            drain_frames(&mut pc_rx),
            vec![ServerMessage::Status {
                message: "Mobile connected".to_string()
            }]
        );
        let app_frames = drain_frames(&mut app_rx);
        assert_eq!(
            app_frames,
            vec![
                ServerMessage::Status {
                    message: "app registered.".to_string()
                },
                ServerMessage::Status {
                    message: "PC connected".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_file_meta_creates_record_and_mirrors_to_peer() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(
            &mut pair.session,
            Role::Pc,
            ClientMessage::FileMeta {
                file_id: "F".to_string(),
                file_name: "x.bin".to_string(),
                total_chunks: 3,
                total_size: Some(3 * 65_536),
            },
            &config,
        )
        .await;

        let record = pair.session.files.get("F").expect("record created");
        assert_eq!(record.sender, Role::Pc);
        assert_eq!(record.status, TransferStatus::Sending);

        assert_eq!(
            drain_frames(&mut pair.app_rx),
            vec![ServerMessage::FileMeta {
                file_id: "F".to_string(),
                file_name: "x.bin".to_string(),
                total_chunks: 3,
                total_size: Some(3 * 65_536),
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_file_meta_rejected() {
        let mut pair = bound_pair();
        let config = Config::default();

        for bad in [
            meta("", 3),
            ClientMessage::FileMeta {
                file_id: "F".to_string(),
                file_name: String::new(),
                total_chunks: 3,
                total_size: None,
            },
            meta("F", 0),
            meta("F", -4),
        ] {
            dispatch(&mut pair.session, Role::Pc, bad, &config).await;
        }

        assert!(pair.session.files.is_empty());
        let errors = drain_frames(&mut pair.pc_rx);
        assert_eq!(errors.len(), 4);
        for frame in errors {
            assert_eq!(
                frame,
                ServerMessage::Error {
                    message: "Invalid file meta".to_string()
                }
            );
        }
        assert!(drain_frames(&mut pair.app_rx).is_empty());
    }

    #[tokio::test]
    async fn test_too_many_transfers_rejected() {
        let mut pair = bound_pair();
        let config = Config::default();

        for i in 0..5 {
            dispatch(&mut pair.session, Role::Pc, meta(&format!("f{i}"), 1), &config).await;
        }
        drain_frames(&mut pair.pc_rx);
        drain_frames(&mut pair.app_rx);

        dispatch(&mut pair.session, Role::Pc, meta("f5", 1), &config).await;

        assert_eq!(pair.session.files.len(), 5);
        assert_eq!(
            drain_frames(&mut pair.pc_rx),
            vec![ServerMessage::Error {
                message: "Too many simultaneous file transfers. Maximum is 5".to_string()
            }]
        );
        assert!(drain_frames(&mut pair.app_rx).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let mut pair = bound_pair();
        let config = Config::default();

        // Explicit size one byte over the cap.
        dispatch(
            &mut pair.session,
            Role::Pc,
            ClientMessage::FileMeta {
                file_id: "big".to_string(),
                file_name: "big.iso".to_string(),
                total_chunks: 1,
                total_size: Some(config.max_file_size + 1),
            },
            &config,
        )
        .await;
        // No announced size: estimated from the chunk count, one chunk
        // past the cap.
        dispatch(&mut pair.session, Role::Pc, meta("big2", 81_921), &config).await;

        assert!(pair.session.files.is_empty());
        let errors = drain_frames(&mut pair.pc_rx);
        assert_eq!(errors.len(), 2);
        for frame in errors {
            assert_eq!(
                frame,
                ServerMessage::Error {
                    message: "File too large. Maximum size is 5120MB".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_chunk_relay_ack_progress_and_completion() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 3), &config).await;
        drain_frames(&mut pair.app_rx);

        for i in 0..3 {
            dispatch(&mut pair.session, Role::Pc, chunk("F", i), &config).await;
            dispatch(&mut pair.session, Role::App, ack("F", i), &config).await;
        }

        let record = pair.session.files.get("F").unwrap();
        assert_eq!(record.status, TransferStatus::Completed);
        assert_eq!(record.received_chunks(), 3);

        let pc_frames = drain_frames(&mut pair.pc_rx);
        let acks = pc_frames
            .iter()
            .filter(|f| matches!(f, ServerMessage::FileChunkAck { .. }))
            .count();
        let pc_completes = pc_frames
            .iter()
            .filter(|f| matches!(f, ServerMessage::FileComplete { .. }))
            .count();
        assert_eq!(acks, 3);
        assert_eq!(pc_completes, 1);

        let app_frames = drain_frames(&mut pair.app_rx);
        let chunks = app_frames
            .iter()
            .filter(|f| matches!(f, ServerMessage::FileChunk { .. }))
            .count();
        let app_completes = app_frames
            .iter()
            .filter(|f| matches!(f, ServerMessage::FileComplete { .. }))
            .count();
        assert_eq!(chunks, 3);
        assert_eq!(app_completes, 1);
        assert!(app_frames.contains(&ServerMessage::FileProgress {
            file_id: "F".to_string(),
            received_chunks: 3,
            total_chunks: 3,
        }));
    }

    #[tokio::test]
    async fn test_duplicate_final_ack_does_not_reannounce_completion() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 1), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;

        let completes = drain_frames(&mut pair.pc_rx)
            .iter()
            .filter(|f| matches!(f, ServerMessage::FileComplete { .. }))
            .count();
        assert_eq!(completes, 1);
    }

    #[tokio::test]
    async fn test_acked_chunk_is_not_forwarded_again() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 3), &config).await;
        dispatch(&mut pair.session, Role::Pc, chunk("F", 0), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;
        drain_frames(&mut pair.app_rx);

        dispatch(&mut pair.session, Role::Pc, chunk("F", 0), &config).await;

        assert!(drain_frames(&mut pair.app_rx).is_empty());
    }

    #[tokio::test]
    async fn test_chunk_for_paused_file_is_dropped() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 3), &config).await;
        dispatch(
            &mut pair.session,
            Role::App,
            ClientMessage::PauseFile {
                file_id: "F".to_string(),
            },
            &config,
        )
        .await;
        drain_frames(&mut pair.app_rx);

        dispatch(&mut pair.session, Role::Pc, chunk("F", 0), &config).await;

        assert!(drain_frames(&mut pair.app_rx).is_empty());
    }

    #[tokio::test]
    async fn test_chunk_with_unbound_receiver_pauses_transfer() {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        let (pc, mut pc_rx) = handle(1, "Desktop");
        session.bind(Role::Pc, pc);
        let config = Config::default();

        dispatch(&mut session, Role::Pc, meta("F", 3), &config).await;
        dispatch(&mut session, Role::Pc, chunk("F", 0), &config).await;

        assert_eq!(
            session.files.get("F").unwrap().status,
            TransferStatus::Paused
        );
        assert!(drain_frames(&mut pc_rx).contains(&ServerMessage::FilePaused {
            file_id: "F".to_string(),
            reason: Some("Receiver unavailable".to_string()),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_retry_exhaustion_pauses_with_relay_failed() {
        let mut session = Session::new("a1b2c3".to_string(), "t".repeat(32));
        let (pc, mut pc_rx) = handle(1, "Desktop");
        // Receiver outbox with a single slot, pre-filled so every
        // forward attempt sees backpressure.
        let (app, _app_rx) = handle_with_capacity(2, "Phone", 1);
        app.safe_send(ServerMessage::Status {
            message: "filler".to_string(),
        });
        session.bind(Role::Pc, pc);
        session.bind(Role::App, app);
        let config = Config::default();

        dispatch(&mut session, Role::Pc, meta("F", 3), &config).await;
        dispatch(&mut session, Role::Pc, chunk("F", 0), &config).await;

        assert_eq!(
            session.files.get("F").unwrap().status,
            TransferStatus::Paused
        );
        assert!(drain_frames(&mut pc_rx).contains(&ServerMessage::FilePaused {
            file_id: "F".to_string(),
            reason: Some("Relay failed".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_pause_and_resume_broadcast_and_recover_missing_set() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 4), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 2), &config).await;
        drain_frames(&mut pair.pc_rx);
        drain_frames(&mut pair.app_rx);

        dispatch(
            &mut pair.session,
            Role::App,
            ClientMessage::PauseFile {
                file_id: "F".to_string(),
            },
            &config,
        )
        .await;
        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Paused
        );
        let paused = ServerMessage::FilePaused {
            file_id: "F".to_string(),
            reason: None,
        };
        assert_eq!(drain_frames(&mut pair.pc_rx), vec![paused.clone()]);
        assert_eq!(drain_frames(&mut pair.app_rx), vec![paused]);

        dispatch(
            &mut pair.session,
            Role::App,
            ClientMessage::ResumeFile {
                file_id: "F".to_string(),
            },
            &config,
        )
        .await;
        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Sending
        );
        let resumed = ServerMessage::FileResumed {
            file_id: "F".to_string(),
        };
        assert_eq!(
            drain_frames(&mut pair.pc_rx),
            vec![
                resumed.clone(),
                ServerMessage::FileMissingChunks {
                    file_id: "F".to_string(),
                    chunks: vec![1, 3],
                },
            ]
        );
        assert_eq!(drain_frames(&mut pair.app_rx), vec![resumed]);
    }

    #[tokio::test]
    async fn test_resume_of_completed_file_is_ignored() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 1), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;
        drain_frames(&mut pair.pc_rx);
        drain_frames(&mut pair.app_rx);

        dispatch(
            &mut pair.session,
            Role::App,
            ClientMessage::ResumeFile {
                file_id: "F".to_string(),
            },
            &config,
        )
        .await;

        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Completed
        );
        assert!(drain_frames(&mut pair.pc_rx).is_empty());
        assert!(drain_frames(&mut pair.app_rx).is_empty());
    }

    #[tokio::test]
    async fn test_request_chunks_forwarded_to_sender() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 8), &config).await;
        drain_frames(&mut pair.app_rx);

        dispatch(
            &mut pair.session,
            Role::App,
            ClientMessage::RequestChunks {
                file_id: "F".to_string(),
                chunks: vec![3, 5, 7],
            },
            &config,
        )
        .await;

        assert_eq!(
            drain_frames(&mut pair.pc_rx),
            vec![ServerMessage::FileMissingChunks {
                file_id: "F".to_string(),
                chunks: vec![3, 5, 7],
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_chunks_answer_relays_payloads_and_ignores_indices() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 8), &config).await;
        drain_frames(&mut pair.app_rx);

        dispatch(
            &mut pair.session,
            Role::Pc,
            ClientMessage::FileMissingChunks {
                file_id: "F".to_string(),
                chunks: vec![
                    ChunkRef::Index(1),
                    ChunkRef::Chunk {
                        chunk_index: 3,
                        data: "QUJD".to_string(),
                    },
                    ChunkRef::Chunk {
                        chunk_index: 5,
                        data: "REVG".to_string(),
                    },
                ],
            },
            &config,
        )
        .await;

        assert_eq!(
            drain_frames(&mut pair.app_rx),
            vec![
                ServerMessage::FileChunk {
                    file_id: "F".to_string(),
                    chunk_index: 3,
                    total_chunks: 8,
                    data: "QUJD".to_string(),
                },
                ServerMessage::FileChunk {
                    file_id: "F".to_string(),
                    chunk_index: 5,
                    total_chunks: 8,
                    data: "REVG".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_sender_disconnect_pauses_its_transfers() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 3), &config).await;
        drain_frames(&mut pair.app_rx);

        pair.session.unbind(Role::Pc, 1);
        on_disconnect(&mut pair.session, Role::Pc, "Desktop");

        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Paused
        );
        assert_eq!(
            drain_frames(&mut pair.app_rx),
            vec![
                ServerMessage::PeerDisconnected {
                    side: Role::Pc,
                    message: "Desktop disconnected".to_string(),
                },
                ServerMessage::FilePaused {
                    file_id: "F".to_string(),
                    reason: Some("Sender disconnected".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_receiver_disconnect_leaves_transfer_sending() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 3), &config).await;
        drain_frames(&mut pair.pc_rx);

        pair.session.unbind(Role::App, 2);
        on_disconnect(&mut pair.session, Role::App, "Phone");

        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Sending
        );
        assert_eq!(
            drain_frames(&mut pair.pc_rx),
            vec![ServerMessage::PeerDisconnected {
                side: Role::App,
                message: "Phone disconnected".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rebind_auto_resumes_paused_transfer() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 4), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 1), &config).await;

        // Receiver drops; the next chunk hits the unavailable path.
        pair.session.unbind(Role::App, 2);
        on_disconnect(&mut pair.session, Role::App, "Phone");
        dispatch(&mut pair.session, Role::Pc, chunk("F", 2), &config).await;
        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Paused
        );
        drain_frames(&mut pair.pc_rx);

        // Receiver comes back.
        let (app, mut app_rx) = handle(3, "Phone");
        pair.session.bind(Role::App, app);
        on_bind(&mut pair.session, Role::App);

        assert_eq!(
            pair.session.files.get("F").unwrap().status,
            TransferStatus::Sending
        );
        assert!(drain_frames(&mut pair.pc_rx).contains(&ServerMessage::FileMissingChunks {
            file_id: "F".to_string(),
            chunks: vec![2, 3],
        }));
        // The rebound receiver is greeted and told about the in-flight file.
        let app_frames = drain_frames(&mut app_rx);
        assert!(app_frames.contains(&ServerMessage::FileMeta {
            file_id: "F".to_string(),
            file_name: "F.bin".to_string(),
            total_chunks: 4,
            total_size: None,
        }));
    }

    #[tokio::test]
    async fn test_on_bind_replays_progress_to_sender_side() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 4), &config).await;
        dispatch(&mut pair.session, Role::App, ack("F", 0), &config).await;

        // Sender reconnects.
        pair.session.unbind(Role::Pc, 1);
        let (pc, mut pc_rx) = handle(3, "Desktop");
        pair.session.bind(Role::Pc, pc);
        on_bind(&mut pair.session, Role::Pc);

        assert!(drain_frames(&mut pc_rx).contains(&ServerMessage::FileProgress {
            file_id: "F".to_string(),
            received_chunks: 1,
            total_chunks: 4,
        }));
    }

    #[tokio::test]
    async fn test_file_complete_notice_forwarded() {
        let mut pair = bound_pair();
        let config = Config::default();

        dispatch(&mut pair.session, Role::Pc, meta("F", 1), &config).await;
        drain_frames(&mut pair.app_rx);

        dispatch(
            &mut pair.session,
            Role::Pc,
            ClientMessage::FileComplete {
                file_id: "F".to_string(),
            },
            &config,
        )
        .await;

        assert_eq!(
            drain_frames(&mut pair.app_rx),
            vec![ServerMessage::FileComplete {
                file_id: "F".to_string(),
            }]
        );
    }
}
