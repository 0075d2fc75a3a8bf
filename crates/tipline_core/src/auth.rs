//! crates/tipline_core/src/auth.rs
//!
//! The codename authenticator: account creation from a bound tab,
//! login by codename, and unique-codename generation.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::codename;
use crate::domain::{ApiToken, NewSource, Source};
use crate::ports::{IdentityStore, Storage, StorageError, StoreError};
use crate::session::SourceSession;

/// Fixed expiration window for API tokens issued at login.
pub const TOKEN_EXPIRATION_MINS: i64 = 120;

/// Upper bound on draws when searching for an unused codename.
const MAX_CODENAME_ATTEMPTS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The codename's derived filesystem id is already taken.
    #[error("an identity already exists for this codename")]
    DuplicateIdentity,
    /// Syntax validation failed. The web layer renders a generic
    /// message; whether the codename exists is never revealed.
    #[error("not a recognized codename")]
    InvalidCodename,
    #[error("unknown or stale browser tab")]
    UnknownTab,
    #[error("could not find an unused codename")]
    CodenameSpaceExhausted,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentity => AuthError::DuplicateIdentity,
            other => AuthError::Store(other),
        }
    }
}

fn issue_token() -> ApiToken {
    ApiToken {
        token: Uuid::new_v4().to_string(),
        expires_at: Utc::now() + Duration::minutes(TOKEN_EXPIRATION_MINS),
    }
}

/// Draw codenames until one derives to an unused filesystem id.
/// The store is consulted per draw; a collision simply retries.
pub async fn generate_unique_codename(
    store: &dyn IdentityStore,
) -> Result<String, AuthError> {
    for _ in 0..MAX_CODENAME_ATTEMPTS {
        let candidate = codename::generate(codename::DEFAULT_WORDS);
        let filesystem_id = codename::filesystem_id(&candidate);
        if store.find_by_filesystem_id(&filesystem_id).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AuthError::CodenameSpaceExhausted)
}

/// Establish the identity whose codename was bound to `tab_id` during
/// generation.
///
/// The binder map is consumed whole: after this call every tab must
/// generate again. On a duplicate filesystem id the insert rolls back
/// and the session is fully cleared, so the caller is not logged in.
pub async fn create_account(
    session: &mut SourceSession,
    tab_id: &str,
    store: &dyn IdentityStore,
    storage: &dyn Storage,
) -> Result<Source, AuthError> {
    let resolved = session
        .resolve(tab_id)
        .map_err(|_| AuthError::UnknownTab)?
        .to_string();
    session.codename = Some(resolved.clone());
    session.release();

    let filesystem_id = codename::filesystem_id(&resolved);
    let new = NewSource {
        filesystem_id: filesystem_id.clone(),
        journalist_designation: codename::display_id(),
    };

    match store.create_source(new).await {
        Ok(source) => {
            storage.ensure_source_dir(&filesystem_id).await?;
            session.logged_in = true;
            session.new_account = true;
            Ok(source)
        }
        Err(StoreError::DuplicateIdentity) => {
            tracing::error!("attempt to create a source with a duplicate codename");
            // Do not leave the caller logged in with partial state.
            session.clear();
            Err(AuthError::DuplicateIdentity)
        }
        Err(other) => Err(other.into()),
    }
}

/// Resume (or lazily establish) the identity for a submitted codename.
///
/// The codename is trimmed and syntax-checked before any store access;
/// an invalid codename leaves the session untouched.
pub async fn login(
    session: &mut SourceSession,
    raw_codename: &str,
    store: &dyn IdentityStore,
) -> Result<Source, AuthError> {
    let trimmed = raw_codename.trim();
    if !codename::valid(trimmed) {
        tracing::info!("login failed for invalid codename");
        return Err(AuthError::InvalidCodename);
    }

    let filesystem_id = codename::filesystem_id(trimmed);
    let source = store
        .find_or_create(NewSource {
            filesystem_id,
            journalist_designation: codename::display_id(),
        })
        .await?;

    session.codename = Some(trimmed.to_string());
    session.logged_in = true;
    session.token = Some(issue_token());
    Ok(source)
}
