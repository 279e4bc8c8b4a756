//! Per-call lifecycle controller.
//!
//! A [`Session`] owns the state of one call and turns every event from either
//! socket (or from one of its timers) into an ordered list of [`Action`]s.
//! The runtime applies the actions in order, which is what enforces the two
//! cross-socket guarantees: a `clear` goes out before any later agent audio,
//! and the `end_call` acknowledgment goes out before either socket is closed.

use crate::{
    protocol::{
        backend::{ClientEvent, OutputItem, ServerEvent},
        inbound::{InboundFrame, OutboundFrame},
    },
    relay::AudioRelay,
    settings::RelaySettings,
    tools::{EndCallReason, ToolDispatcher},
};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInboundStart,
    AwaitingBackendReady,
    Active,
    Interrupted,
    Ending,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingInboundStart => "awaiting_inbound_start",
            SessionState::AwaitingBackendReady => "awaiting_backend_ready",
            SessionState::Active => "active",
            SessionState::Interrupted => "interrupted",
            SessionState::Ending => "ending",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Side effects requested by the session, applied by the runtime in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open the backend socket; the runtime reports back via `on_backend_ready`.
    OpenBackend,
    /// Call `on_settle_elapsed` after the delay.
    ScheduleConfigure(Duration),
    SendBackend(ClientEvent),
    SendInbound(OutboundFrame),
    /// Call `on_close_timer_elapsed` after the delay unless cancelled.
    ArmCloseTimer(Duration),
    CancelCloseTimer,
    CloseBackend,
    CloseInbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendLink {
    Absent,
    Connecting,
    Open,
    Released,
}

pub struct Session {
    stream_sid: Option<String>,
    call_sid: Option<String>,
    state: SessionState,
    settings: Arc<RelaySettings>,
    backend: BackendLink,
    configured: bool,
    close_timer_armed: bool,
    relay: AudioRelay,
    tools: ToolDispatcher,
    transcript: Vec<String>,
    end_reason: Option<EndCallReason>,
}

impl Session {
    pub fn new(settings: Arc<RelaySettings>) -> Self {
        Self {
            stream_sid: None,
            call_sid: None,
            state: SessionState::AwaitingInboundStart,
            settings,
            backend: BackendLink::Absent,
            configured: false,
            close_timer_armed: false,
            relay: AudioRelay::new(),
            tools: ToolDispatcher::new(),
            transcript: Vec::new(),
            end_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Utterances reported through `capture_user_text`, in order.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn end_reason(&self) -> Option<EndCallReason> {
        self.end_reason
    }

    pub fn close_timer_armed(&self) -> bool {
        self.close_timer_armed
    }

    pub fn on_inbound_connect(&mut self) -> Vec<Action> {
        info!("Media stream connected; awaiting start");
        Vec::new()
    }

    pub fn on_inbound_message(&mut self, text: &str) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame");
                return Vec::new();
            }
        };

        match frame {
            InboundFrame::Start { start } => {
                if self.state != SessionState::AwaitingInboundStart {
                    warn!(stream_sid = %start.stream_sid, "Ignoring repeated start event");
                    return Vec::new();
                }
                info!(stream_sid = %start.stream_sid, "Incoming stream has started");
                self.stream_sid = Some(start.stream_sid);
                self.call_sid = start.call_sid;
                self.backend = BackendLink::Connecting;
                self.transition(SessionState::AwaitingBackendReady);
                vec![Action::OpenBackend]
            }
            InboundFrame::Media { media } => {
                if self.backend != BackendLink::Open {
                    debug!("Backend not open; dropping caller audio");
                    return Vec::new();
                }
                vec![Action::SendBackend(self.relay.inbound_audio(media.payload))]
            }
            InboundFrame::Stop => {
                info!("Inbound stream stopped");
                self.on_inbound_close()
            }
            InboundFrame::Connected | InboundFrame::Mark | InboundFrame::Unknown => {
                debug!("Received non-media event");
                Vec::new()
            }
        }
    }

    pub fn on_backend_ready(&mut self) -> Vec<Action> {
        match (self.state, self.backend) {
            (SessionState::AwaitingBackendReady, BackendLink::Connecting) => {
                info!("Connected to the realtime backend");
                self.backend = BackendLink::Open;
                vec![Action::ScheduleConfigure(self.settings.settle_delay)]
            }
            (SessionState::Closed, _) => {
                debug!("Backend became ready after teardown; releasing it");
                vec![Action::CloseBackend]
            }
            (state, backend) => {
                warn!(%state, ?backend, "Unexpected backend ready notification");
                Vec::new()
            }
        }
    }

    /// The settling delay after backend-ready has passed: configure once.
    pub fn on_settle_elapsed(&mut self) -> Vec<Action> {
        if self.configured
            || self.backend != BackendLink::Open
            || self.state != SessionState::AwaitingBackendReady
        {
            return Vec::new();
        }
        self.configured = true;
        self.transition(SessionState::Active);
        info!(voice = %self.settings.voice, "Sending session update");
        vec![Action::SendBackend(ClientEvent::SessionUpdate {
            session: self.settings.session_config(),
        })]
    }

    pub fn on_backend_message(&mut self, text: &str) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping backend event");
                return Vec::new();
            }
        };
        let kind = event.kind();

        match event {
            ServerEvent::ResponseAudioDelta { delta } => {
                let Some(stream_sid) = self.stream_sid.as_deref() else {
                    return Vec::new();
                };
                self.relay
                    .backend_audio(stream_sid, delta)
                    .map(Action::SendInbound)
                    .into_iter()
                    .collect()
            }
            ServerEvent::InputAudioBufferSpeechStarted => {
                info!("User started speaking");
                self.interrupt()
            }
            ServerEvent::ResponseDone { response } => {
                info!(status = ?response.status, items = response.output.len(), "Received event: response.done");
                self.dispatch_tools(&response.output)
            }
            ServerEvent::SessionCreated { .. } | ServerEvent::SessionUpdated { .. } => {
                info!(event = kind, "Backend session event");
                Vec::new()
            }
            ServerEvent::Error { error } => {
                warn!(kind = ?error.kind, code = ?error.code, message = %error.message, "Backend reported an error");
                Vec::new()
            }
            ServerEvent::InputAudioBufferSpeechStopped
            | ServerEvent::InputAudioBufferCommitted
            | ServerEvent::RateLimitsUpdated => {
                debug!(event = kind, "Received event");
                Vec::new()
            }
            ServerEvent::Other => Vec::new(),
        }
    }

    pub fn on_inbound_close(&mut self) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        info!("Client disconnected");
        let mut actions = self.teardown();
        if matches!(self.backend, BackendLink::Connecting | BackendLink::Open) {
            actions.push(Action::CloseBackend);
        }
        self.backend = BackendLink::Released;
        actions
    }

    pub fn on_backend_close(&mut self) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        info!("Disconnected from the realtime backend");
        self.backend = BackendLink::Released;
        let mut actions = self.teardown();
        actions.push(Action::CloseInbound);
        actions
    }

    /// The grace delay after `end_call` has passed.
    pub fn on_close_timer_elapsed(&mut self) -> Vec<Action> {
        if !self.close_timer_armed || self.state != SessionState::Ending {
            return Vec::new();
        }
        self.close_timer_armed = false;
        info!("Grace delay elapsed; closing call");
        let mut actions = self.teardown();
        // backend first; the caller leg is never closed before it
        if matches!(self.backend, BackendLink::Connecting | BackendLink::Open) {
            actions.push(Action::CloseBackend);
        }
        self.backend = BackendLink::Released;
        actions.push(Action::CloseInbound);
        actions
    }

    fn interrupt(&mut self) -> Vec<Action> {
        let Some(stream_sid) = self.stream_sid.as_deref() else {
            return Vec::new();
        };
        let Some(clear) = self.relay.interrupt(stream_sid) else {
            return Vec::new();
        };
        if self.state == SessionState::Active {
            self.transition(SessionState::Interrupted);
            self.transition(SessionState::Active);
        }
        info!("Clearing caller playback");
        vec![Action::SendInbound(clear)]
    }

    fn dispatch_tools(&mut self, items: &[OutputItem]) -> Vec<Action> {
        let batch = self.tools.dispatch(items);
        self.transcript.extend(batch.transcripts.iter().cloned());

        let continue_response = batch.should_continue();
        let mut actions: Vec<Action> = batch.results.into_iter().map(Action::SendBackend).collect();

        if let Some(reason) = batch.end_call {
            if matches!(
                self.state,
                SessionState::AwaitingBackendReady | SessionState::Active | SessionState::Interrupted
            ) {
                self.end_reason = Some(reason);
                self.transition(SessionState::Ending);
                self.close_timer_armed = true;
                info!(%reason, grace = ?self.settings.grace_delay, "Call ending after grace delay");
                actions.push(Action::ArmCloseTimer(self.settings.grace_delay));
            }
        } else if continue_response && self.state != SessionState::Ending {
            actions.push(Action::SendBackend(ClientEvent::ResponseCreate));
        }
        actions
    }

    /// Common part of every path into `Closed`.
    fn teardown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.close_timer_armed {
            self.close_timer_armed = false;
            actions.push(Action::CancelCloseTimer);
        }
        let abandoned = self.tools.abandon_all();
        if abandoned > 0 {
            warn!(abandoned, "Abandoning unresolved tool calls");
        }
        self.transition(SessionState::Closed);
        info!(
            utterances = self.transcript.len(),
            frames_in = self.relay.frames_in(),
            frames_out = self.relay.frames_out(),
            end_reason = ?self.end_reason,
            "Session closed"
        );
        actions
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
    }
}
