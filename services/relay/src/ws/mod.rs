//! Media Stream Relay
//!
//! Everything that runs per telephony call lives here:
//!
//! - `session`: upgrades the media stream and owns its socket tasks.
//! - `runner`: the per-call queue that drives a core `Session`.
//! - `provider`: connections to the realtime backend.
//! - `timers`: the settle and grace timers.

pub mod event;
pub mod provider;
mod runner;
pub mod session;
mod timers;

pub use runner::SessionRunner;
pub use session::media_stream_handler;
