//! Best-effort audit trail of domain events.
//!
//! Appends never run inside a Room critical section and never surface
//! failures to clients.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::store::{LogKind, Store};

#[derive(Clone)]
pub struct EventLogger {
    store: Arc<dyn Store>,
}

impl EventLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fire-and-forget append. The returned handle is for tests; callers
    /// drop it.
    pub fn log(
        &self,
        kind: LogKind,
        user_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append_log_event(kind, user_id, payload).await {
                tracing::warn!(event = ?kind, error = %e, "Failed to append log event");
            }
        })
    }
}
