//! Per-connection driver
//!
//! Each upgraded socket gets a writer task draining its outbox and a
//! read loop that parses one JSON frame at a time. Parse failures are
//! logged and dropped, never fatal. A displaced driver (its slot was
//! rebound) exits via the shutdown signal without touching the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::protocol::constants::OUTBOX_CAPACITY;
use crate::protocol::{ClientMessage, Role};
use crate::relay::engine;
use crate::relay::server::AppState;
use crate::session::{ConnectionHandle, OutboundFrame};

pub(crate) async fn run_connection(
    socket: WebSocket,
    state: AppState,
    pair_id: String,
    role: Role,
    device_name: String,
) {
    let conn_id = state.next_conn_id();
    let (sink, mut stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let alive = Arc::new(AtomicBool::new(true));
    let handle = ConnectionHandle::new(
        conn_id,
        device_name.clone(),
        outbox_tx,
        alive.clone(),
        shutdown_tx,
    );

    // The writer exits on its own once every outbox sender is dropped,
    // flushing any queued close frame first.
    tokio::spawn(write_loop(sink, outbox_rx));

    let Some(session) = state.registry.get(&pair_id).await else {
        // Session reaped between authentication and upgrade completion.
        return;
    };
    {
        let mut locked = session.lock().await;
        if let Some(old) = locked.bind(role, handle) {
            debug!(%pair_id, %role, old_conn = old.conn_id, "slot occupied, replacing connection");
            old.close("replaced");
        }
        engine::on_bind(&mut locked, role);
    }
    info!(%pair_id, %role, device = %device_name, conn_id, "connection bound");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(text) => {
                        let msg: ClientMessage = match serde_json::from_str(text.as_str()) {
                            Ok(msg) => msg,
                            Err(e) => {
                                debug!(%pair_id, %role, error = %e, "dropping unparseable frame");
                                continue;
                            }
                        };
                        let mut locked = session.lock().await;
                        engine::dispatch(&mut locked, role, msg, &state.config).await;
                    }
                    Message::Pong(_) => alive.store(true, Ordering::SeqCst),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    let mut locked = session.lock().await;
    if locked.unbind(role, conn_id).is_some() {
        engine::on_disconnect(&mut locked, role, &device_name);
        info!(%pair_id, %role, conn_id, "connection closed");
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbox.recv().await {
        let message = match frame {
            OutboundFrame::Frame(msg) => match serde_json::to_string(&msg) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound frame");
                    continue;
                }
            },
            OutboundFrame::Ping => Message::Ping(axum::body::Bytes::new()),
            OutboundFrame::Close(reason) => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: Utf8Bytes::from_static(reason),
                    })))
                    .await;
                break;
            }
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
}
