//! Voice Relay Service Library Crate
//!
//! The HTTP surface, configuration, and per-call socket plumbing that bridge
//! a telephony media stream to a realtime voice backend. Session semantics
//! live in `voice-relay-core`; the `relay` binary is a thin wrapper around
//! this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
