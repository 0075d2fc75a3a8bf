//! crates/tipline_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases,
//! key stores, or filesystems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NewSource, Reply, Source, Submission};

//=========================================================================================
// Port Error Types
//=========================================================================================

/// Errors surfaced by the identity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The derived `filesystem_id` already exists (codename reused across
    /// identities). Returned explicitly rather than thrown, so callers
    /// handle it as a value.
    #[error("an identity with this filesystem id already exists")]
    DuplicateIdentity,
    #[error("not found: {0}")]
    NotFound(String),
    /// The interaction counter moved between read and commit; the whole
    /// intake was rolled back.
    #[error("interaction counter advanced concurrently")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the encryption collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no key material for this identity")]
    KeyNotFound,
    #[error("malformed ciphertext or key material: {0}")]
    Malformed(String),
    #[error("crypto backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the on-disk storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("storage io error: {0}")]
    Io(String),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The identity store: persisted Source/Submission/Reply records. Owns
/// uniqueness and counters; every mutation is one commit-or-rollback
/// transaction.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Single atomic insert of a new source with `pending = true` and
    /// `interaction_count = 0`. A unique-constraint violation on
    /// `filesystem_id` rolls back and returns
    /// [`StoreError::DuplicateIdentity`].
    async fn create_source(&self, new: NewSource) -> Result<Source, StoreError>;

    async fn find_by_filesystem_id(
        &self,
        filesystem_id: &str,
    ) -> Result<Option<Source>, StoreError>;

    /// Look up the source for this `filesystem_id`, lazily creating the
    /// row if it does not exist yet (login path).
    async fn find_or_create(&self, new: NewSource) -> Result<Source, StoreError>;

    /// Reserve the counter slots for one intake: advance
    /// `interaction_count` by `units`, set `pending = false` and
    /// `last_updated = now`, all in one guarded update.
    ///
    /// `expected_count` is the counter value the caller read; if the
    /// stored counter no longer matches, nothing changes and
    /// [`StoreError::Conflict`] is returned. A successful reservation
    /// makes the sequence numbers `expected_count+1 ..= expected_count+units`
    /// exclusive to this intake, so the caller may write files under them
    /// before any Submission row exists.
    async fn reserve_intake(
        &self,
        source_id: i64,
        expected_count: i64,
        units: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Insert one Submission row per filename, in one transaction.
    /// Called once the files of a reserved intake are on disk.
    async fn record_submissions(
        &self,
        source_id: i64,
        filenames: &[String],
    ) -> Result<Vec<Submission>, StoreError>;

    async fn find_non_deleted_replies(&self, source_id: i64) -> Result<Vec<Reply>, StoreError>;

    /// Fetch a reply by filename, scoped to the owning source. A reply
    /// that exists but belongs to another source is indistinguishable
    /// from one that does not exist.
    async fn find_reply_owned(&self, source_id: i64, filename: &str)
        -> Result<Reply, StoreError>;

    async fn mark_reply_deleted(&self, reply_id: i64) -> Result<(), StoreError>;

    /// Soft-delete the current non-deleted set; returns how many rows
    /// were marked.
    async fn mark_all_replies_deleted(&self, source_id: i64) -> Result<usize, StoreError>;

    /// Pending sources in creation order descending, skipping the
    /// `keep_most_recent` newest ones (the reaper's candidate query).
    async fn find_pending_older_than_top_n(
        &self,
        keep_most_recent: usize,
    ) -> Result<Vec<Source>, StoreError>;

    /// Delete the source row in its own transaction, re-checking that
    /// `pending` is still true at delete time. Returns `false` when the
    /// row was skipped because a submission flipped it concurrently.
    async fn delete_source_if_pending(&self, source_id: i64) -> Result<bool, StoreError>;

    /// Attach an asynchronously computed checksum to a submission row.
    async fn attach_checksum(&self, submission_id: i64, checksum: &str)
        -> Result<(), StoreError>;
}

/// The encryption collaborator: per-identity key material plus reply
/// sealing/opening. The source's codename is the decryption context.
#[async_trait]
pub trait Encryption: Send + Sync {
    /// Provision the identity's reply key. Idempotent.
    async fn gen_key_pair(&self, filesystem_id: &str, codename: &str) -> Result<(), CryptoError>;

    /// Fingerprint of the identity's reply key, or `None` if no key has
    /// been provisioned yet.
    async fn fingerprint(&self, filesystem_id: &str) -> Result<Option<String>, CryptoError>;

    /// Encrypt material at rest for this identity.
    async fn seal(&self, filesystem_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a reply using the codename as the decryption context.
    async fn open(&self, codename: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Remove the identity's key material. Absent key material is not an
    /// error: the identity is already clean.
    async fn delete_key_pair(&self, filesystem_id: &str) -> Result<(), CryptoError>;
}

/// The on-disk storage collaborator: path construction and file writes.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the identity's storage directory if missing. Idempotent.
    async fn ensure_source_dir(&self, filesystem_id: &str) -> Result<(), StorageError>;

    /// Persist a message submission; returns the assigned filename,
    /// which encodes `(count, journalist_filename)`.
    async fn save_message(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        message: &str,
    ) -> Result<String, StorageError>;

    /// Persist a document submission; returns the assigned filename.
    async fn save_file(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        original_filename: &str,
        contents: &[u8],
    ) -> Result<String, StorageError>;

    /// Read a reply's ciphertext together with the file's modification
    /// time, fetched at read time (the inbox sort key is never cached).
    async fn reply_bytes(
        &self,
        filesystem_id: &str,
        filename: &str,
    ) -> Result<(Vec<u8>, DateTime<Utc>), StorageError>;

    /// Flatten file timestamps for the identity after an intake so the
    /// write order is not observable. Delegated; failures are logged by
    /// the caller, never fatal.
    async fn normalize_timestamps(&self, filesystem_id: &str) -> Result<(), StorageError>;
}

/// Fire-and-forget dispatch of post-commit checksum work. Must not
/// block and must not fail the intake: implementations log and drop on
/// a full or closed queue.
pub trait ChecksumQueue: Send + Sync {
    fn enqueue(&self, submission: &Submission);
}
