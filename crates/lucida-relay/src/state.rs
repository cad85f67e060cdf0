use std::sync::Arc;

use chrono::{DateTime, Utc};
use lucida_core::{MemoryStore, SessionStore};

use crate::activity::Address;
use crate::backend::Backend;
use crate::connector::ReplySender;
use crate::relay::Relay;

/// A reply waiting to be collected by a polling client.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReply {
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub pending: Arc<dyn SessionStore<PendingReply>>,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
            pending: Arc::new(MemoryStore::<PendingReply>::new()),
        }
    }

    /// Build state around the given collaborators with in-memory tables.
    pub fn with_parts(backend: Arc<dyn Backend>, sender: Arc<dyn ReplySender>) -> Self {
        let addresses = Arc::new(MemoryStore::<Address>::new());
        Self::new(Relay::new(backend, sender, addresses))
    }
}
