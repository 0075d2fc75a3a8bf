//! crates/tipline_core/src/session.rs
//!
//! The per-request session context and the codename session binder.
//!
//! During account generation, each browser tab is handed a distinct
//! high-entropy `tab_id` and the codename rendered in that tab is bound
//! to it here. The binding lives only between generation and account
//! creation; concurrent tabs never see each other's codenames because
//! the map is additive and keyed by tab.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use crate::domain::ApiToken;

/// Entropy of a tab identifier, before encoding.
const TAB_ID_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The tab id is unknown or stale: generation never ran in this
    /// session, or the binder map was already released.
    #[error("unknown or stale browser tab")]
    UnknownTab,
}

/// Generate a fresh tab identifier: 64 random bytes, URL-safe encoded.
pub fn generate_tab_id() -> String {
    let mut bytes = [0u8; TAB_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Session state for one source, passed by reference into each core
/// component. Replaces ambient per-process session globals.
#[derive(Debug, Clone, Default)]
pub struct SourceSession {
    /// The binder map: tab id to not-yet-persisted codename.
    codenames: HashMap<String, String>,
    /// The codename of the established identity, once created or
    /// logged in.
    pub codename: Option<String>,
    pub logged_in: bool,
    pub token: Option<ApiToken>,
    /// Set when this session created its identity (first-visit copy in
    /// the inbox response).
    pub new_account: bool,
}

impl SourceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a rendered codename to a tab. Additive: binding a second
    /// tab never evicts the first.
    pub fn bind(&mut self, tab_id: String, codename: String) {
        self.codenames.insert(tab_id, codename);
    }

    /// Resolve the codename bound to `tab_id`. Failure is a hard error;
    /// the caller's tab was never part of this session.
    pub fn resolve(&self, tab_id: &str) -> Result<&str, SessionError> {
        self.codenames
            .get(tab_id)
            .map(String::as_str)
            .ok_or(SessionError::UnknownTab)
    }

    /// Drop the entire binder map. Called once account creation has
    /// consumed its binding; any other tab must generate again.
    pub fn release(&mut self) {
        self.codenames.clear();
    }

    /// Clear everything: binder map, codename, token, flags. Used on
    /// logout and after a duplicate-identity failure, so the caller is
    /// never left logged in with partial state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
