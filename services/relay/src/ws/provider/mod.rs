//! Connections to the realtime conversational backend.

pub mod openai;

use super::event::{BackendCommand, SessionEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

/// Channel capacity between a session runner and its backend writer task.
pub(crate) const BACKEND_CHANNEL_SIZE: usize = 256;

/// How long `BackendLink::close` waits for the close frame to be written.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens backend connections for new sessions.
///
/// Implementations push every frame the backend sends into `events` as
/// [`SessionEvent::Backend`], and finish with exactly one of
/// [`SessionEvent::BackendClosed`] or a backend [`SessionEvent::Failed`].
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<BackendLink>;
}

/// A session's exclusive handle on its backend socket.
///
/// Dropping the link stops the reader task; the writer task closes the socket
/// once the command channel is gone.
#[derive(Debug)]
pub struct BackendLink {
    tx: mpsc::Sender<BackendCommand>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl BackendLink {
    pub fn new(
        tx: mpsc::Sender<BackendCommand>,
        writer: Option<JoinHandle<()>>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self { tx, writer, reader }
    }

    pub async fn send(&self, text: String) -> Result<()> {
        self.tx
            .send(BackendCommand::Send(text))
            .await
            .map_err(|_| anyhow::anyhow!("backend writer has stopped"))
    }

    /// Sends a close frame after everything already queued, then waits for
    /// the writer to finish so the backend is closed before anything after it.
    pub async fn close(mut self) {
        let _ = self.tx.send(BackendCommand::Close).await;
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err() {
                warn!("Backend writer did not finish closing in time");
            }
        }
    }
}

impl Drop for BackendLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
