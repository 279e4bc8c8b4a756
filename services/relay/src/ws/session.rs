//! Manages the lifecycle of one telephony media stream connection.

use super::{
    event::{InboundCommand, SessionEvent},
    runner::{EVENT_QUEUE_SIZE, SessionRunner},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;
use voice_relay_core::{RelayError, Side};

const INBOUND_CHANNEL_SIZE: usize = 1024;

/// Axum handler to upgrade a media stream request to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one media stream connection to completion.
///
/// The socket is split between a writer task draining [`InboundCommand`]s
/// and a reader task posting into the session queue; the runner sits between
/// them and owns all session state.
#[instrument(name = "media_stream", skip_all, fields(connection_id, stream_sid))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", connection_id.to_string());
    info!("Client connected");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(EVENT_QUEUE_SIZE);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundCommand>(INBOUND_CHANNEL_SIZE);

    let writer = tokio::spawn(
        async move {
            while let Some(command) = inbound_rx.recv().await {
                match command {
                    InboundCommand::Frame(text) => {
                        if let Err(e) = socket_tx.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to write to media stream");
                            break;
                        }
                    }
                    InboundCommand::Close => {
                        let _ = socket_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = socket_tx.close().await;
            debug!("Media stream writer finished");
        }
        .in_current_span(),
    );

    let reader_events = events_tx.clone();
    let reader = tokio::spawn(
        async move {
            while let Some(msg_result) = socket_rx.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if reader_events
                            .send(SessionEvent::Inbound(text.to_string()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => warn!("Ignoring binary frame on media stream"),
                    Ok(_) => {}
                    Err(e) => {
                        let err = RelayError::connection(Side::Inbound, e);
                        let _ = reader_events.send(SessionEvent::Failed(err)).await;
                        return;
                    }
                }
            }
            let _ = reader_events.send(SessionEvent::InboundClosed).await;
        }
        .in_current_span(),
    );

    let runner = SessionRunner::from_state(&state, events_tx, inbound_tx);
    if let Err(e) = runner.run(events_rx).await {
        error!(error = ?e, "Session ended with an error");
    }

    reader.abort();
    if let Err(e) = writer.await {
        if !e.is_cancelled() {
            error!(error = %e, "Media stream writer panicked");
        }
    }
    info!("Client disconnected");
}
