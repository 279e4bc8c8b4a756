//! Voice Relay Core
//!
//! Transport-free logic for bridging a telephony media stream with a realtime
//! conversational backend. Everything in this crate is synchronous: handlers
//! consume one event and return the [`session::Action`]s the runtime must
//! perform, which keeps ordering guarantees testable without sockets.

pub mod error;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod settings;
pub mod store;
pub mod tools;

pub use error::{RelayError, Side};
pub use session::{Action, Session, SessionState};
pub use settings::RelaySettings;
