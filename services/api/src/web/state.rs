//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the server-side session map.

use std::collections::HashMap;
use std::sync::Arc;

use tipline_core::ports::{ChecksumQueue, Encryption, IdentityStore, Storage};
use tipline_core::session::SourceSession;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub vault: Arc<dyn Encryption>,
    pub storage: Arc<dyn Storage>,
    pub checksums: Arc<dyn ChecksumQueue>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
}

/// Server-side session map keyed by the `sid` cookie. Each entry is one
/// [`SourceSession`], the per-request context object the core components
/// receive by reference.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SourceSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_sid() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn load(&self, sid: &str) -> Option<SourceSession> {
        self.inner.read().await.get(sid).cloned()
    }

    pub async fn save(&self, sid: &str, session: SourceSession) {
        self.inner.write().await.insert(sid.to_string(), session);
    }

    pub async fn remove(&self, sid: &str) {
        self.inner.write().await.remove(sid);
    }
}
