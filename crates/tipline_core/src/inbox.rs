//! crates/tipline_core/src/inbox.rs
//!
//! The reply inbox: listing and decrypting non-deleted replies,
//! soft-deleting a single reply, and soft-deleting the whole inbox.

use crate::domain::{DecryptedReply, Source};
use crate::ports::{CryptoError, Encryption, IdentityStore, Storage, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    /// The named reply does not belong to the calling source. Always an
    /// error, never silently ignored.
    #[error("reply does not belong to this source")]
    OwnershipViolation,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<StoreError> for InboxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => InboxError::OwnershipViolation,
            other => InboxError::Store(other),
        }
    }
}

/// List the source's readable replies, most recent first.
///
/// A reply whose file is missing or whose ciphertext does not decode is
/// logged and skipped; it never aborts the rest of the listing. As a
/// side effect the identity's reply key is provisioned if absent.
pub async fn list(
    source: &Source,
    codename: &str,
    store: &dyn IdentityStore,
    storage: &dyn Storage,
    encryption: &dyn Encryption,
) -> Result<Vec<DecryptedReply>, InboxError> {
    let rows = store.find_non_deleted_replies(source.id).await?;

    let mut replies = Vec::with_capacity(rows.len());
    for reply in rows {
        // The mtime is the sort key and is fetched at read time.
        let (ciphertext, date) = match storage
            .reply_bytes(&source.filesystem_id, &reply.filename)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::error!(filename = %reply.filename, error = %err, "reply file missing");
                continue;
            }
        };
        let plaintext = match encryption.open(codename, &ciphertext).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::error!(filename = %reply.filename, "could not decode reply");
                    continue;
                }
            },
            Err(err) => {
                tracing::error!(filename = %reply.filename, error = %err, "could not decrypt reply");
                continue;
            }
        };
        replies.push(DecryptedReply {
            reply,
            plaintext,
            date,
        });
    }

    replies.sort_by(|a, b| b.date.cmp(&a.date));

    // Lazy key provisioning so the journalist side can encrypt replies.
    if encryption.fingerprint(&source.filesystem_id).await?.is_none() {
        encryption
            .gen_key_pair(&source.filesystem_id, codename)
            .await?;
    }

    Ok(replies)
}

/// Soft-delete one reply from the source's inbox. The row must belong
/// to the calling source; the underlying file is preserved for the
/// journalist side.
pub async fn delete(
    source: &Source,
    reply_filename: &str,
    store: &dyn IdentityStore,
) -> Result<(), InboxError> {
    let reply = store.find_reply_owned(source.id, reply_filename).await?;
    store.mark_reply_deleted(reply.id).await?;
    Ok(())
}

/// Soft-delete the source's current non-deleted set. An empty set is a
/// no-op, but it is reported as unusual: the caller only reaches this
/// path when the interface believed replies existed.
pub async fn delete_all(source: &Source, store: &dyn IdentityStore) -> Result<usize, InboxError> {
    let marked = store.mark_all_replies_deleted(source.id).await?;
    if marked == 0 {
        tracing::error!(source_uuid = %source.uuid, "found no replies when at least one was expected");
    }
    Ok(marked)
}
