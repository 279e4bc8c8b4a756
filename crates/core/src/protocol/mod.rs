//! Wire formats of the two sockets a session bridges.
//!
//! - `inbound`: Twilio Media Streams envelopes (telephony side).
//! - `backend`: OpenAI Realtime client and server events.

pub mod backend;
pub mod inbound;
