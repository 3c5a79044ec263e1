//! WebSocket connection handling.
//!
//! Each socket is split in two: a writer task drains the connection's
//! outbound queue onto the wire, and the reader loop feeds decoded frames to
//! the coordinator. Whichever side stops first ends the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use qios_core::{Coordinator, Outbound};
use qios_env::{ConnId, TokioContext};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type AppState = Arc<Coordinator<TokioContext>>;

pub async fn ws_handler(ws: WebSocketUpgrade, State(coordinator): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: AppState) {
    let (sender, receiver) = socket.split();
    serve_connection(coordinator, ConnId::new(), sender, receiver).await;
}

/// Runs one connection until the peer closes, the stream fails or the
/// writer can no longer deliver. The connection is unregistered on exit.
async fn serve_connection<S, R, E>(coordinator: AppState, conn: ConnId, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    coordinator.on_connect(conn, tx);

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(conn = %conn, error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!(conn = %conn, error = %e, "writer stopped");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = coordinator.handle_frame(conn, &text) {
                        debug!(conn = %conn, error = %e, "ignoring frame");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by axum; binary frames carry nothing for us
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = %conn, error = %e, "socket error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    if let Err(e) = coordinator.on_disconnect(conn) {
        debug!(conn = %conn, error = %e, "connection already gone");
    }
}
