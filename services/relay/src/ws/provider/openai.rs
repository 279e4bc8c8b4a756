//! Handles the real-time WebSocket connection to the OpenAI Realtime API.

use super::{BACKEND_CHANNEL_SIZE, BackendConnector, BackendLink};
use crate::ws::event::{BackendCommand, SessionEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{Instrument, debug, info, warn};
use voice_relay_core::{RelayError, Side};

pub struct OpenAiConnector {
    url: String,
    api_key: SecretString,
}

impl OpenAiConnector {
    pub fn new(url: String, api_key: SecretString) -> Self {
        Self { url, api_key }
    }
}

#[async_trait]
impl BackendConnector for OpenAiConnector {
    /// Connects, then splits the socket into a writer task fed by the
    /// returned link and a reader task feeding the session queue.
    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<BackendLink> {
        let mut request = self.url.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.api_key.expose_secret()).parse()?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse()?);

        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to OpenAI Realtime WebSocket")?;
        let (mut openai_tx, mut openai_rx) = ws_stream.split();
        info!("Connected to the OpenAI Realtime API");

        let (tx, mut rx) = mpsc::channel::<BackendCommand>(BACKEND_CHANNEL_SIZE);

        let writer = tokio::spawn(
            async move {
                while let Some(command) = rx.recv().await {
                    match command {
                        BackendCommand::Send(text) => {
                            if let Err(e) = openai_tx.send(WsMessage::Text(text.into())).await {
                                warn!(error = %e, "Failed to send to OpenAI");
                                break;
                            }
                        }
                        BackendCommand::Close => {
                            let _ = openai_tx.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
                let _ = openai_tx.close().await;
                debug!("OpenAI writer finished");
            }
            .in_current_span(),
        );

        let reader = tokio::spawn(
            async move {
                while let Some(msg_result) = openai_rx.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            if events
                                .send(SessionEvent::Backend(text.to_string()))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        Ok(WsMessage::Close(frame)) => {
                            info!(?frame, "OpenAI closed the connection");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let err = RelayError::connection(Side::Backend, e);
                            let _ = events.send(SessionEvent::Failed(err)).await;
                            return;
                        }
                    }
                }
                let _ = events.send(SessionEvent::BackendClosed).await;
            }
            .in_current_span(),
        );

        Ok(BackendLink::new(tx, Some(writer), Some(reader)))
    }
}
