//! services/api/src/adapters/checksum.rs
//!
//! Post-commit checksum computation, modeled as a bounded work queue
//! with one worker task. Intake never blocks on it and never fails
//! because of it: a full or closed queue is logged and the job dropped.

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tipline_core::domain::Submission;
use tipline_core::ports::{ChecksumQueue, IdentityStore};
use tokio::sync::mpsc;

use super::db::SqliteStore;

struct ChecksumJob {
    submission_id: i64,
    source_id: i64,
    filename: String,
}

/// Sending half handed to intake via the `ChecksumQueue` port.
#[derive(Clone)]
pub struct ChecksumDispatcher {
    tx: mpsc::Sender<ChecksumJob>,
}

impl ChecksumQueue for ChecksumDispatcher {
    fn enqueue(&self, submission: &Submission) {
        let job = ChecksumJob {
            submission_id: submission.id,
            source_id: submission.source_id,
            filename: submission.filename.clone(),
        };
        if let Err(err) = self.tx.try_send(job) {
            tracing::warn!(
                filename = %submission.filename,
                error = %err,
                "checksum queue unavailable, submission delivered without checksum"
            );
        }
    }
}

/// Spawn the worker task and return the dispatcher. The worker runs for
/// the life of the process and drains jobs as they arrive.
pub fn spawn_checksum_worker(
    store: Arc<SqliteStore>,
    store_dir: PathBuf,
    queue_depth: usize,
) -> ChecksumDispatcher {
    let (tx, mut rx) = mpsc::channel::<ChecksumJob>(queue_depth);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if let Err(err) = process(&store, &store_dir, &job).await {
                tracing::warn!(
                    filename = %job.filename,
                    error = %err,
                    "could not attach checksum"
                );
            }
        }
    });
    ChecksumDispatcher { tx }
}

async fn process(
    store: &SqliteStore,
    store_dir: &std::path::Path,
    job: &ChecksumJob,
) -> Result<(), String> {
    let filesystem_id = store
        .source_filesystem_id(job.source_id)
        .await
        .map_err(|e| e.to_string())?;
    let path = store_dir.join(&filesystem_id).join(&job.filename);
    let contents = tokio::fs::read(&path).await.map_err(|e| e.to_string())?;
    let checksum = format!("sha256:{}", hex::encode(Sha256::digest(&contents)));
    store
        .attach_checksum(job.submission_id, &checksum)
        .await
        .map_err(|e| e.to_string())
}
