use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::event::SessionEvent;

/// Cancellable one-shot timers owned by a session runner.
///
/// A firing timer posts its event into the session queue, so it is handled
/// in line with socket traffic. A stop signal sent before the deadline
/// prevents the post.
#[derive(Default)]
pub struct SessionTimers {
    settle_stop: Option<oneshot::Sender<()>>,
    close_stop: Option<oneshot::Sender<()>>,
}

impl SessionTimers {
    pub fn start_settle(&mut self, tx: mpsc::Sender<SessionEvent>, delay: Duration) {
        if self.settle_stop.is_some() {
            return;
        }
        self.settle_stop = Some(spawn_timer(tx, delay, SessionEvent::SettleElapsed));
    }

    pub fn start_close(&mut self, tx: mpsc::Sender<SessionEvent>, delay: Duration) {
        if self.close_stop.is_some() {
            return;
        }
        self.close_stop = Some(spawn_timer(tx, delay, SessionEvent::CloseTimerElapsed));
    }

    /// Returns true if a close timer was armed.
    pub fn cancel_close(&mut self) -> bool {
        match self.close_stop.take() {
            Some(stop) => {
                let _ = stop.send(());
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        if let Some(stop) = self.settle_stop.take() {
            let _ = stop.send(());
        }
        self.cancel_close();
    }

    pub fn close_armed(&self) -> bool {
        self.close_stop.is_some()
    }
}

fn spawn_timer(
    tx: mpsc::Sender<SessionEvent>,
    delay: Duration,
    event: SessionEvent,
) -> oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let _ = tx.send(event).await;
            }
            _ = &mut stop_rx => {}
        }
    });
    stop_tx
}
