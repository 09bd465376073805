use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// Mutable health signals fed by the event handler and send path.
#[derive(Default)]
pub struct HealthState {
    connected: AtomicBool,
    authenticated: AtomicBool,
    event_errors: AtomicU64,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<LastError>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

impl HealthState {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub async fn record_sync(&self) {
        *self.last_sync_at.lock().await = Some(Utc::now());
    }

    pub async fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.lock().await
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        self.event_errors.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().await = Some(LastError {
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn event_errors(&self) -> u64 {
        self.event_errors.load(Ordering::SeqCst)
    }

    pub async fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().await.clone()
    }
}

/// The derived health view served by `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeHealth {
    pub ready: bool,
    pub running: bool,
    pub authenticated: bool,
    pub connected: bool,
    pub messages_db_ok: bool,
    pub sessions_db_ok: bool,
    pub chats: u64,
    pub messages: u64,
    pub db_size_bytes: u64,
    pub event_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    pub backup: &'static str,
}
