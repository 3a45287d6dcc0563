//! # Worker Module
//!
//! This module drives one served connection, coordinating a reader and
//! a writer task for clean shutdown.
//!
//! ## Core Functionality
//!
//! - **Reader Task**: Feeds decoded commands into the connection and
//!   runs the expiration timer
//! - **Writer Task**: Flushes replies into the outgoing sink with
//!   batching
//! - **Task Coordination**: Either side failing tears the other down

use futures::{Sink, SinkExt, Stream, StreamExt};

use crate::errors::{Disconnect, DisconnectCode};
use crate::protocol::{Command, Reply};
use crate::server::connection::Connection;
use crate::server::dispatch::far_future;
use crate::server::hooks::HookSet;
use crate::server::types::ServeParams;

/// Serves one connection over a decoded command stream
///
/// This function owns the complete lifecycle of a connection: handshake,
/// command processing, lease expiration and teardown. It returns once
/// the connection is closed and both tasks have finished.
///
/// ## Arguments
///
/// * `incoming` - Stream of decoded commands with their frame ids
/// * `outgoing` - Sink taking numbered replies, terminated by one final
///   disconnect item carrying the close reason
/// * `params` - Per-connection serve parameters
/// * `hooks` - Hooks registered on the server
///
/// ## Task Architecture
///
/// 1. **Reader Task**: Waits on the incoming stream, the connection
///    context, the expiration timer and the closer signal. Processes
///    commands in arrival order, one at a time; a due lease is
///    re-validated before the next command is read.
/// 2. **Writer Task**: Receives replies from the internal channel in
///    batches and feeds them into the sink. A failed write or a
///    terminal item ends the connection.
///
/// ## Connection Lifecycle
///
/// 1. **Setup**: Create channels, spawn tasks
/// 2. **Processing**: Commands in, replies out, leases re-validated
/// 3. **Cleanup**: Terminal disconnect item written, hooks notified
pub async fn serve_connection<In, Out>(
    mut incoming: In,
    mut outgoing: Out,
    params: ServeParams,
    hooks: HookSet,
) where
    In: Stream<Item = (u32, Command)> + Send + Unpin + 'static,
    Out: Sink<Result<(u32, Reply), Disconnect>> + Send + Unpin + 'static,
{
    let (closer_tx, mut closer_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (reply_ch_tx, mut reply_ch_rx) = tokio::sync::mpsc::channel(64);

    let reader_task = tokio::spawn(async move {
        let mut timer_expire = Box::pin(tokio::time::sleep_until(far_future()));

        let mut connection = Connection::new(params, hooks, reply_ch_tx.clone());

        let disconnect: Disconnect = 'outer: loop {
            // the connect hook may swap the context, watch the current one
            let context = connection.context().clone();

            tokio::select! {
                biased;

                _ = closer_rx.recv() => {
                    break 'outer DisconnectCode::CONNECTION_CLOSED.into();
                }

                _ = context.cancelled() => {
                    break 'outer DisconnectCode::CONNECTION_CLOSED.into();
                }

                _ = timer_expire.as_mut() => {
                    if let Err(disconnect) = connection.run_expirations().await {
                        break 'outer disconnect;
                    }
                    timer_expire
                        .as_mut()
                        .reset(connection.next_deadline().unwrap_or_else(far_future));
                }

                remote_msg = incoming.next() => {
                    let (frame_id, frame) = match remote_msg {
                        Some(frame) => frame,
                        None => break 'outer DisconnectCode::CONNECTION_CLOSED.into(),
                    };

                    if let Err(disconnect) = connection.process_command(frame_id, frame).await {
                        break 'outer disconnect;
                    }
                    timer_expire
                        .as_mut()
                        .reset(connection.next_deadline().unwrap_or_else(far_future));
                }
            }
        };

        let _ = reply_ch_tx.send(Err(disconnect.clone())).await;
        connection.shutdown(&disconnect).await;
    });

    let writer_task = tokio::spawn(async move {
        let mut batch = Vec::new();

        let disconnect: Disconnect = 'outer: loop {
            let control_msgs = reply_ch_rx.recv_many(&mut batch, 32).await;
            if control_msgs == 0 {
                break 'outer DisconnectCode::CONNECTION_CLOSED.into();
            }

            let mut error = None;

            for message in batch.drain(..) {
                match message {
                    Ok(frame) => {
                        if outgoing.feed(Ok(frame)).await.is_err() {
                            break 'outer DisconnectCode::WRITE_ERROR.into();
                        }
                    }
                    Err(err) => {
                        error = Some(err);
                        break;
                    }
                }
            }

            if outgoing.flush().await.is_err() {
                break 'outer DisconnectCode::WRITE_ERROR.into();
            }

            if let Some(err) = error {
                break 'outer err;
            }
        };

        let _ = closer_tx.try_send(());
        let _ = outgoing.send(Err(disconnect.clone())).await;
        let _ = outgoing.close().await;
        log::debug!(
            "client disconnected, code={}, reason={}",
            disconnect.code.0,
            disconnect.reason
        );
    });

    let (reader, writer) = tokio::join!(reader_task, writer_task);
    if reader.is_err() || writer.is_err() {
        log::debug!("failed to join reader and writer tasks");
    }
}
