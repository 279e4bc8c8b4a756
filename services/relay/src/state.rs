//! Shared Application State
//!
//! Holds the resources every media stream connection needs: the relay
//! settings, the backend connector, and the registry of live calls.

use crate::ws::provider::BackendConnector;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use voice_relay_core::{RelaySettings, store::SessionStore};

/// Bookkeeping for one live call, keyed by stream id in the registry.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(call_sid: Option<String>) -> Self {
        Self {
            call_sid,
            started_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> TimeDelta {
        Utc::now() - self.started_at
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RelaySettings>,
    pub connector: Arc<dyn BackendConnector>,
    pub calls: Arc<Mutex<SessionStore<CallRecord>>>,
}

impl AppState {
    pub fn new(settings: RelaySettings, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            settings: Arc::new(settings),
            connector,
            calls: Arc::new(Mutex::new(SessionStore::new())),
        }
    }
}
