//! crates/tipline_core/src/intake.rs
//!
//! Submission intake: sequence-number assignment, filename construction
//! through the storage collaborator, and the single-transaction commit
//! of every row an intake produces.

use chrono::Utc;

use crate::domain::{FileUpload, IntakeOutcome, Receipt, Source};
use crate::ports::{ChecksumQueue, IdentityStore, Storage, StorageError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// Neither a message nor an accepted file was present.
    #[error("a message or document is required")]
    EmptySubmission,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Accept one intake for `source`.
///
/// Content units are processed in a fixed order, message then file; each
/// takes the next interaction counter value, so filenames are strictly
/// ordered and never reused even when both units arrive together. The
/// counter slots are reserved up front in one guarded update (failing
/// with `Conflict` when another intake advanced the counter), so a
/// racing intake can never write a file under a sequence number this
/// intake owns. The files are then written under the reserved numbers
/// and their Submission rows inserted as one unit of work.
///
/// File acceptance is gated by `allow_document_uploads`; a file sent
/// while uploads are disabled is not read at all.
pub async fn submit(
    source: &Source,
    message: Option<&str>,
    file: Option<&FileUpload>,
    allow_document_uploads: bool,
    store: &dyn IdentityStore,
    storage: &dyn Storage,
    checksums: &dyn ChecksumQueue,
) -> Result<IntakeOutcome, IntakeError> {
    let message = message.filter(|m| !m.is_empty());
    let file = if allow_document_uploads { file } else { None };
    if message.is_none() && file.is_none() {
        return Err(IntakeError::EmptySubmission);
    }

    // Idempotent; the directory normally exists since account creation.
    storage.ensure_source_dir(&source.filesystem_id).await?;

    // Captured before any increment: selects the first-contact
    // acknowledgment and nothing else.
    let first_submission = source.interaction_count == 0;
    let journalist_filename = source.journalist_filename();
    let units = message.is_some() as i64 + file.is_some() as i64;

    // The reservation must precede the writes: once it succeeds the
    // sequence numbers below belong to this intake alone.
    store
        .reserve_intake(source.id, source.interaction_count, units, Utc::now())
        .await?;

    // A write failure past this point leaves reserved slots unused;
    // the counter is gap-tolerant.
    let mut count = source.interaction_count;
    let mut filenames = Vec::with_capacity(2);
    if let Some(msg) = message {
        count += 1;
        filenames.push(
            storage
                .save_message(&source.filesystem_id, count, &journalist_filename, msg)
                .await?,
        );
    }
    if let Some(upload) = file {
        count += 1;
        filenames.push(
            storage
                .save_file(
                    &source.filesystem_id,
                    count,
                    &journalist_filename,
                    &upload.filename,
                    &upload.contents,
                )
                .await?,
        );
    }

    let submissions = store.record_submissions(source.id, &filenames).await?;

    // Fire-and-forget once the rows land: checksum failure never
    // unwinds a delivered submission.
    for submission in &submissions {
        checksums.enqueue(submission);
    }

    if let Err(err) = storage.normalize_timestamps(&source.filesystem_id).await {
        tracing::warn!(
            filesystem_id = %source.filesystem_id,
            error = %err,
            "could not normalize timestamps after intake"
        );
    }

    let receipt = if first_submission {
        Receipt::FirstSubmission
    } else {
        match (message.is_some(), file.is_some()) {
            (true, false) => Receipt::Message,
            (false, true) => Receipt::Document,
            _ => Receipt::MessageAndDocument,
        }
    };

    Ok(IntakeOutcome {
        submissions,
        receipt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename;
    use crate::testutil::{MemoryStorage, MemoryStore, RecordingChecksums};

    const CODENAME: &str = "quiet copper ravine solemn ember";

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            filename: name.to_string(),
            contents: b"document bytes".to_vec(),
        }
    }

    #[tokio::test]
    async fn first_message_gets_sequence_one_and_flips_pending() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);

        let outcome = submit(&source, Some("hello"), None, true, &store, &storage, &checksums)
            .await
            .unwrap();

        assert_eq!(outcome.receipt, Receipt::FirstSubmission);
        assert_eq!(outcome.submissions.len(), 1);
        assert!(outcome.submissions[0].filename.starts_with("1-"));

        let updated = store.source(source.id).unwrap();
        assert_eq!(updated.interaction_count, 1);
        assert!(!updated.pending);
        assert!(updated.last_updated.is_some());
        assert_eq!(checksums.enqueued.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn message_and_file_take_ordered_sequence_numbers() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 1);

        let outcome = submit(
            &source,
            Some("follow-up"),
            Some(&upload("leak.pdf")),
            true,
            &store,
            &storage,
            &checksums,
        )
        .await
        .unwrap();

        assert_eq!(outcome.receipt, Receipt::MessageAndDocument);
        let names: Vec<&str> = outcome
            .submissions
            .iter()
            .map(|s| s.filename.as_str())
            .collect();
        assert!(names[0].starts_with("2-") && names[0].ends_with("-msg.gpg"));
        assert!(names[1].starts_with("3-") && names[1].ends_with("-doc.gz.gpg"));

        let updated = store.source(source.id).unwrap();
        assert_eq!(updated.interaction_count, 3);
        assert_eq!(checksums.enqueued.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_state_change() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);

        let err = submit(&source, Some(""), None, true, &store, &storage, &checksums)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::EmptySubmission));

        let unchanged = store.source(source.id).unwrap();
        assert_eq!(unchanged.interaction_count, 0);
        assert!(unchanged.pending);
    }

    #[tokio::test]
    async fn file_is_ignored_when_uploads_are_disabled() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);

        // File only, uploads disabled: nothing to accept.
        let err = submit(
            &source,
            None,
            Some(&upload("leak.pdf")),
            false,
            &store,
            &storage,
            &checksums,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IntakeError::EmptySubmission));

        // Message plus file, uploads disabled: only the message lands.
        let outcome = submit(
            &source,
            Some("text only"),
            Some(&upload("leak.pdf")),
            false,
            &store,
            &storage,
            &checksums,
        )
        .await
        .unwrap();
        assert_eq!(outcome.submissions.len(), 1);
        assert_eq!(outcome.receipt, Receipt::FirstSubmission);
    }

    #[tokio::test]
    async fn failed_reservation_advances_nothing() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);
        store
            .fail_reserve
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = submit(&source, Some("hello"), None, true, &store, &storage, &checksums)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Store(StoreError::Backend(_))));

        let unchanged = store.source(source.id).unwrap();
        assert_eq!(unchanged.interaction_count, 0);
        assert!(unchanged.pending);
        assert!(checksums.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_counter_advance_is_a_conflict() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);

        // A racing intake commits between our read and our commit.
        let racing = store.source(source.id).unwrap();
        submit(&racing, Some("raced"), None, true, &store, &storage, &checksums)
            .await
            .unwrap();

        let err = submit(&source, Some("stale"), None, true, &store, &storage, &checksums)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Store(StoreError::Conflict)));

        let current = store.source(source.id).unwrap();
        assert_eq!(current.interaction_count, 1);
    }

    #[tokio::test]
    async fn stale_intake_never_touches_delivered_files() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let checksums = RecordingChecksums::new();
        let source = store.seed_source(&codename::filesystem_id(CODENAME), 0);

        // Both intakes read `interaction_count == 0`; the first one wins.
        let stale = store.source(source.id).unwrap();
        let winner = submit(&source, Some("raced"), None, true, &store, &storage, &checksums)
            .await
            .unwrap();

        let err = submit(&stale, Some("stale"), None, true, &store, &storage, &checksums)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Store(StoreError::Conflict)));

        // The loser failed its reservation before writing anything, so
        // the winner's file still holds the winner's bytes.
        let (bytes, _) = storage
            .reply_bytes(&source.filesystem_id, &winner.submissions[0].filename)
            .await
            .unwrap();
        assert_eq!(bytes, b"raced");
    }
}
