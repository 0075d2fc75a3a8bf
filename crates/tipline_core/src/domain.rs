//! crates/tipline_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A source identity as persisted by the identity store.
#[derive(Debug, Clone)]
pub struct Source {
    /// Stable internal key.
    pub id: i64,
    /// External-facing key.
    pub uuid: Uuid,
    /// Derived from the codename; stable, never reused.
    pub filesystem_id: String,
    /// Human-readable label shown to journalists and encoded into
    /// submission filenames.
    pub journalist_designation: String,
    /// True until the first submission completes; never set back to true.
    pub pending: bool,
    /// Number of content units ever submitted. Seeds submission
    /// filenames; `pending == (interaction_count == 0)` at all times.
    pub interaction_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Filesystem-safe form of the designation, used as the filename
    /// component (`"dressed haircut"` becomes `"dressed_haircut"`).
    pub fn journalist_filename(&self) -> String {
        self.journalist_designation
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// The fields the authenticator supplies when inserting a new source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub filesystem_id: String,
    pub journalist_designation: String,
}

/// A single submitted content unit (a message or an uploaded document).
///
/// Created only by submission intake and never mutated afterwards; the
/// checksum is attached asynchronously by the checksum worker.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub uuid: Uuid,
    pub source_id: i64,
    pub filename: String,
    pub checksum: Option<String>,
}

/// A journalist reply row. The backing ciphertext file is never removed
/// by this crate; `deleted_by_source` only hides it from the source.
#[derive(Debug, Clone)]
pub struct Reply {
    pub id: i64,
    pub uuid: Uuid,
    pub source_id: i64,
    pub filename: String,
    pub deleted_by_source: bool,
}

/// A reply the inbox managed to read and decrypt, paired with the
/// modification time of its backing file (the sort key).
#[derive(Debug, Clone)]
pub struct DecryptedReply {
    pub reply: Reply,
    pub plaintext: String,
    pub date: DateTime<Utc>,
}

/// An uploaded document, as handed to submission intake.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub contents: Vec<u8>,
}

/// Opaque API token issued at login, with a fixed expiration window.
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Which acknowledgment the caller should render after an intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// The source's very first submission.
    FirstSubmission,
    /// Repeat contact, message only.
    Message,
    /// Repeat contact, document only.
    Document,
    /// Repeat contact, message and document together.
    MessageAndDocument,
}

/// Result of a successful submission intake.
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub submissions: Vec<Submission>,
    pub receipt: Receipt,
}

/// Result of one reaper run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReapReport {
    /// Candidates considered (not necessarily all deleted).
    pub found: usize,
    /// Candidates actually removed.
    pub deleted: usize,
}
