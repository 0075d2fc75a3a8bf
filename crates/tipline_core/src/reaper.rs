//! crates/tipline_core/src/reaper.rs
//!
//! The pending-account reaper: out-of-band batch removal of identities
//! that never completed a submission, together with their key material.

use crate::domain::ReapReport;
use crate::ports::{Encryption, IdentityStore};

/// Hard-delete abandoned pending identities, keeping the
/// `keep_most_recent` newest ones untouched.
///
/// Every candidate is handled in isolation: a failed key deletion or a
/// failed row deletion is logged and the loop proceeds. The row is only
/// removed while `pending` is still true at delete time, guarding
/// against a submission that just flipped it. Partial failure is
/// expected operational noise; the report never signals it as fatal.
pub async fn reap(
    keep_most_recent: usize,
    store: &dyn IdentityStore,
    encryption: &dyn Encryption,
) -> ReapReport {
    let candidates = match store.find_pending_older_than_top_n(keep_most_recent).await {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::error!(error = %err, "could not enumerate pending sources");
            return ReapReport::default();
        }
    };

    let mut report = ReapReport {
        found: candidates.len(),
        deleted: 0,
    };

    for source in candidates {
        // Absent key material is already-clean; the port treats it as Ok.
        if let Err(err) = encryption.delete_key_pair(&source.filesystem_id).await {
            tracing::error!(
                source_uuid = %source.uuid,
                error = %err,
                "could not remove key material, keeping the source row"
            );
            continue;
        }
        match store.delete_source_if_pending(source.id).await {
            Ok(true) => report.deleted += 1,
            Ok(false) => {
                tracing::warn!(
                    source_uuid = %source.uuid,
                    "source no longer pending at delete time, skipped"
                );
            }
            Err(err) => {
                tracing::error!(
                    source_uuid = %source.uuid,
                    error = %err,
                    "could not remove pending source"
                );
            }
        }
    }

    report
}
