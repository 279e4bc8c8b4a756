//! Messages exchanged between a session's runner and its socket tasks.

use super::provider::BackendLink;
use voice_relay_core::RelayError;

/// Everything that can happen to a session, serialized through one queue.
#[derive(Debug)]
pub enum SessionEvent {
    /// A text frame from the telephony media stream.
    Inbound(String),
    InboundClosed,
    /// The backend socket is open.
    BackendReady(BackendLink),
    /// A text frame from the backend socket.
    Backend(String),
    BackendClosed,
    /// A socket failed; connection errors end the session.
    Failed(RelayError),
    SettleElapsed,
    CloseTimerElapsed,
}

/// Commands for the task that owns the write half of the media stream.
#[derive(Debug, PartialEq)]
pub enum InboundCommand {
    Frame(String),
    Close,
}

/// Commands for the task that owns the write half of the backend socket.
#[derive(Debug, PartialEq)]
pub enum BackendCommand {
    Send(String),
    Close,
}
