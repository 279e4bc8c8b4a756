//! The per-session dispatch loop.
//!
//! A runner owns one [`Session`] and drains that session's event queue one
//! event at a time, applying the resulting actions in order before taking the
//! next event. Socket reader tasks and timers only ever post into the queue.

use super::{
    event::{InboundCommand, SessionEvent},
    provider::{BackendConnector, BackendLink},
    timers::SessionTimers,
};
use crate::state::{AppState, CallRecord};
use anyhow::Result;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, warn};
use voice_relay_core::{Action, RelayError, RelaySettings, Session, Side, store::SessionStore};

/// Capacity of a session's event queue.
pub(crate) const EVENT_QUEUE_SIZE: usize = 1024;

pub struct SessionRunner {
    session: Session,
    connector: Arc<dyn BackendConnector>,
    calls: Option<Arc<tokio::sync::Mutex<SessionStore<CallRecord>>>>,
    events_tx: mpsc::Sender<SessionEvent>,
    inbound_tx: mpsc::Sender<InboundCommand>,
    backend: Option<BackendLink>,
    connecting: Option<JoinHandle<()>>,
    timers: SessionTimers,
    registered: Option<String>,
}

impl SessionRunner {
    pub fn new(
        settings: Arc<RelaySettings>,
        connector: Arc<dyn BackendConnector>,
        events_tx: mpsc::Sender<SessionEvent>,
        inbound_tx: mpsc::Sender<InboundCommand>,
    ) -> Self {
        Self {
            session: Session::new(settings),
            connector,
            calls: None,
            events_tx,
            inbound_tx,
            backend: None,
            connecting: None,
            timers: SessionTimers::default(),
            registered: None,
        }
    }

    pub fn from_state(
        state: &AppState,
        events_tx: mpsc::Sender<SessionEvent>,
        inbound_tx: mpsc::Sender<InboundCommand>,
    ) -> Self {
        let mut runner = Self::new(
            state.settings.clone(),
            state.connector.clone(),
            events_tx,
            inbound_tx,
        );
        runner.calls = Some(state.calls.clone());
        runner
    }

    /// Runs until the session is closed or every event producer is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        let actions = self.session.on_inbound_connect();
        self.apply_all(actions).await;

        while let Some(event) = events.recv().await {
            let actions = self.handle(event);
            self.apply_all(actions).await;
            self.sync_registration().await;

            if self.session.is_closed() {
                break;
            }
        }

        if !self.session.is_closed() {
            warn!("Session queue ended before the session closed");
        }
        self.shutdown().await;
        Ok(())
    }

    fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        match event {
            SessionEvent::Inbound(text) => self.session.on_inbound_message(&text),
            SessionEvent::InboundClosed => self.session.on_inbound_close(),
            SessionEvent::BackendReady(link) => {
                self.connecting = None;
                self.backend = Some(link);
                self.session.on_backend_ready()
            }
            SessionEvent::Backend(text) => self.session.on_backend_message(&text),
            SessionEvent::BackendClosed => self.session.on_backend_close(),
            SessionEvent::Failed(err) => {
                if !err.is_fatal() {
                    warn!(error = %err, "Ignoring relay error");
                    return Vec::new();
                }
                error!(error = %err, "Session connection failed");
                match err.side() {
                    Some(Side::Inbound) => self.session.on_inbound_close(),
                    _ => {
                        self.connecting = None;
                        self.session.on_backend_close()
                    }
                }
            }
            SessionEvent::SettleElapsed => self.session.on_settle_elapsed(),
            SessionEvent::CloseTimerElapsed => self.session.on_close_timer_elapsed(),
        }
    }

    async fn apply_all(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.apply(action).await;
        }
    }

    async fn apply(&mut self, action: Action) {
        match action {
            Action::OpenBackend => self.open_backend(),
            Action::ScheduleConfigure(delay) => {
                self.timers.start_settle(self.events_tx.clone(), delay)
            }
            Action::SendBackend(event) => {
                let Some(link) = &self.backend else {
                    warn!("No backend connection; dropping client event");
                    return;
                };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = link.send(text).await {
                            warn!(error = %e, "Failed to forward to backend");
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize client event"),
                }
            }
            Action::SendInbound(frame) => match serde_json::to_string(&frame) {
                Ok(text) => {
                    if self.inbound_tx.send(InboundCommand::Frame(text)).await.is_err() {
                        warn!("Media stream writer has stopped");
                    }
                }
                Err(e) => error!(error = %e, "Failed to serialize media frame"),
            },
            Action::ArmCloseTimer(delay) => {
                if self.timers.close_armed() {
                    warn!("Close timer already armed");
                    return;
                }
                info!(grace_ms = delay.as_millis() as u64, "Close timer armed");
                self.timers.start_close(self.events_tx.clone(), delay);
            }
            Action::CancelCloseTimer => {
                if self.timers.cancel_close() {
                    debug!("Close timer cancelled");
                }
            }
            Action::CloseBackend => {
                if let Some(task) = self.connecting.take() {
                    task.abort();
                }
                if let Some(link) = self.backend.take() {
                    link.close().await;
                }
            }
            Action::CloseInbound => {
                let _ = self.inbound_tx.send(InboundCommand::Close).await;
            }
        }
    }

    fn open_backend(&mut self) {
        if self.backend.is_some() || self.connecting.is_some() {
            warn!("Backend already open for this session");
            return;
        }
        let connector = self.connector.clone();
        let events = self.events_tx.clone();
        self.connecting = Some(tokio::spawn(
            async move {
                let event = match connector.connect(events.clone()).await {
                    Ok(link) => SessionEvent::BackendReady(link),
                    Err(e) => SessionEvent::Failed(RelayError::connection(
                        Side::Backend,
                        format!("{:#}", e),
                    )),
                };
                let _ = events.send(event).await;
            }
            .in_current_span(),
        ));
    }

    /// Keeps the registry of active calls in step with the session.
    async fn sync_registration(&mut self) {
        let Some(calls) = &self.calls else {
            return;
        };
        if self.registered.is_none() && !self.session.is_closed() {
            if let Some(stream_sid) = self.session.stream_sid() {
                tracing::Span::current().record("stream_sid", stream_sid);
                let record = CallRecord::new(self.session.call_sid().map(str::to_string));
                let mut calls = calls.lock().await;
                match calls.insert(stream_sid, record) {
                    Ok(()) => {
                        info!(active_calls = calls.len(), "Call registered");
                        self.registered = Some(stream_sid.to_string());
                    }
                    Err(e) => warn!(error = %e, "Call not registered"),
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        self.timers.cancel_all();
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        if let Some(link) = self.backend.take() {
            link.close().await;
        }
        if let (Some(calls), Some(stream_sid)) = (&self.calls, self.registered.take()) {
            let mut calls = calls.lock().await;
            if let Some(record) = calls.remove(&stream_sid) {
                info!(
                    active_calls = calls.len(),
                    duration_secs = record.elapsed().num_seconds(),
                    utterances = self.session.transcript().len(),
                    "Call deregistered"
                );
            }
        }
        info!(state = %self.session.state(), "Session runner finished");
    }
}
