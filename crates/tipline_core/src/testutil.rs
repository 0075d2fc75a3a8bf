//! In-memory port implementations shared by the component tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::codename;
use crate::domain::{NewSource, Reply, Source, Submission};
use crate::ports::{
    ChecksumQueue, CryptoError, Encryption, IdentityStore, StorageError, Storage, StoreError,
};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

//=========================================================================================
// MemoryStore
//=========================================================================================

#[derive(Default)]
struct StoreInner {
    sources: Vec<Source>,
    submissions: Vec<Submission>,
    replies: Vec<Reply>,
    next_source_id: i64,
    next_submission_id: i64,
    next_reply_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    /// When set, `reserve_intake` fails with no mutation, simulating a
    /// rolled-back transaction.
    pub fail_reserve: AtomicBool,
    /// When set, `delete_source_if_pending` fails, simulating a
    /// per-candidate transaction error.
    pub fail_delete: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a source row directly, for test setup.
    pub fn seed_source(&self, filesystem_id: &str, interaction_count: i64) -> Source {
        let mut inner = self.inner.lock().unwrap();
        inner.next_source_id += 1;
        let source = Source {
            id: inner.next_source_id,
            uuid: Uuid::new_v4(),
            filesystem_id: filesystem_id.to_string(),
            journalist_designation: "weary lantern".to_string(),
            pending: interaction_count == 0,
            interaction_count,
            last_updated: None,
            created_at: ts(inner.next_source_id),
        };
        inner.sources.push(source.clone());
        source
    }

    /// Insert a reply row directly, for test setup.
    pub fn seed_reply(&self, source_id: i64, filename: &str) -> Reply {
        let mut inner = self.inner.lock().unwrap();
        inner.next_reply_id += 1;
        let reply = Reply {
            id: inner.next_reply_id,
            uuid: Uuid::new_v4(),
            source_id,
            filename: filename.to_string(),
            deleted_by_source: false,
        };
        inner.replies.push(reply.clone());
        reply
    }

    /// Current snapshot of a source row.
    pub fn source(&self, id: i64) -> Option<Source> {
        let inner = self.inner.lock().unwrap();
        inner.sources.iter().find(|s| s.id == id).cloned()
    }

    pub fn source_count(&self) -> usize {
        self.inner.lock().unwrap().sources.len()
    }

    /// Flip `pending` off out-of-band, simulating a submission racing
    /// the reaper between candidate selection and deletion.
    pub fn force_not_pending(&self, id: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(s) = inner.sources.iter_mut().find(|s| s.id == id) {
            s.pending = false;
            s.interaction_count = s.interaction_count.max(1);
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_source(&self, new: NewSource) -> Result<Source, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .sources
            .iter()
            .any(|s| s.filesystem_id == new.filesystem_id)
        {
            return Err(StoreError::DuplicateIdentity);
        }
        inner.next_source_id += 1;
        let source = Source {
            id: inner.next_source_id,
            uuid: Uuid::new_v4(),
            filesystem_id: new.filesystem_id,
            journalist_designation: new.journalist_designation,
            pending: true,
            interaction_count: 0,
            last_updated: None,
            created_at: ts(inner.next_source_id),
        };
        inner.sources.push(source.clone());
        Ok(source)
    }

    async fn find_by_filesystem_id(
        &self,
        filesystem_id: &str,
    ) -> Result<Option<Source>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sources
            .iter()
            .find(|s| s.filesystem_id == filesystem_id)
            .cloned())
    }

    async fn find_or_create(&self, new: NewSource) -> Result<Source, StoreError> {
        if let Some(existing) = self.find_by_filesystem_id(&new.filesystem_id).await? {
            return Ok(existing);
        }
        self.create_source(new).await
    }

    async fn reserve_intake(
        &self,
        source_id: i64,
        expected_count: i64,
        units: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_reserve.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated reservation failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let source = inner
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| StoreError::NotFound(format!("source {source_id}")))?;
        if source.interaction_count != expected_count {
            return Err(StoreError::Conflict);
        }
        source.interaction_count += units;
        source.pending = false;
        source.last_updated = Some(now);
        Ok(())
    }

    async fn record_submissions(
        &self,
        source_id: i64,
        filenames: &[String],
    ) -> Result<Vec<Submission>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut created = Vec::with_capacity(filenames.len());
        for filename in filenames {
            inner.next_submission_id += 1;
            created.push(Submission {
                id: inner.next_submission_id,
                uuid: Uuid::new_v4(),
                source_id,
                filename: filename.clone(),
                checksum: None,
            });
        }
        inner.submissions.extend(created.iter().cloned());
        Ok(created)
    }

    async fn find_non_deleted_replies(&self, source_id: i64) -> Result<Vec<Reply>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .replies
            .iter()
            .filter(|r| r.source_id == source_id && !r.deleted_by_source)
            .cloned()
            .collect())
    }

    async fn find_reply_owned(
        &self,
        source_id: i64,
        filename: &str,
    ) -> Result<Reply, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .replies
            .iter()
            .find(|r| r.source_id == source_id && r.filename == filename)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("reply {filename}")))
    }

    async fn mark_reply_deleted(&self, reply_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let reply = inner
            .replies
            .iter_mut()
            .find(|r| r.id == reply_id)
            .ok_or_else(|| StoreError::NotFound(format!("reply id {reply_id}")))?;
        reply.deleted_by_source = true;
        Ok(())
    }

    async fn mark_all_replies_deleted(&self, source_id: i64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut marked = 0;
        for reply in inner
            .replies
            .iter_mut()
            .filter(|r| r.source_id == source_id && !r.deleted_by_source)
        {
            reply.deleted_by_source = true;
            marked += 1;
        }
        Ok(marked)
    }

    async fn find_pending_older_than_top_n(
        &self,
        keep_most_recent: usize,
    ) -> Result<Vec<Source>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<Source> = inner
            .sources
            .iter()
            .filter(|s| s.pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(pending.into_iter().skip(keep_most_recent).collect())
    }

    async fn delete_source_if_pending(&self, source_id: i64) -> Result<bool, StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated delete failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(pos) = inner.sources.iter().position(|s| s.id == source_id) else {
            return Ok(false);
        };
        if !inner.sources[pos].pending {
            return Ok(false);
        }
        inner.sources.remove(pos);
        inner.submissions.retain(|s| s.source_id != source_id);
        inner.replies.retain(|r| r.source_id != source_id);
        Ok(true)
    }

    async fn attach_checksum(
        &self,
        submission_id: i64,
        checksum: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let submission = inner
            .submissions
            .iter_mut()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| StoreError::NotFound(format!("submission id {submission_id}")))?;
        submission.checksum = Some(checksum.to_string());
        Ok(())
    }
}

//=========================================================================================
// MemoryVault
//=========================================================================================

/// Transparent "encryption": seal prefixes the ciphertext with the
/// filesystem id, open re-derives it from the codename and strips it.
/// Enough to exercise the codename-as-decryption-context contract.
#[derive(Default)]
pub struct MemoryVault {
    fingerprints: Mutex<HashMap<String, String>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_key(&self, filesystem_id: &str) -> bool {
        self.fingerprints
            .lock()
            .unwrap()
            .contains_key(filesystem_id)
    }

    /// Make `delete_key_pair` fail for this identity, simulating a
    /// keyring error on one candidate.
    pub fn fail_key_delete_for(&self, filesystem_id: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert(filesystem_id.to_string());
    }

    pub fn seal_for(filesystem_id: &str, plaintext: &[u8]) -> Vec<u8> {
        let mut out = filesystem_id.as_bytes().to_vec();
        out.extend_from_slice(plaintext);
        out
    }
}

#[async_trait]
impl Encryption for MemoryVault {
    async fn gen_key_pair(&self, filesystem_id: &str, _codename: &str) -> Result<(), CryptoError> {
        self.fingerprints
            .lock()
            .unwrap()
            .entry(filesystem_id.to_string())
            .or_insert_with(|| format!("FP{}", &filesystem_id[..8.min(filesystem_id.len())]));
        Ok(())
    }

    async fn fingerprint(&self, filesystem_id: &str) -> Result<Option<String>, CryptoError> {
        Ok(self
            .fingerprints
            .lock()
            .unwrap()
            .get(filesystem_id)
            .cloned())
    }

    async fn seal(&self, filesystem_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(Self::seal_for(filesystem_id, plaintext))
    }

    async fn open(&self, codename: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let fsid = codename::filesystem_id(codename);
        ciphertext
            .strip_prefix(fsid.as_bytes())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| CryptoError::Malformed("wrong decryption context".into()))
    }

    async fn delete_key_pair(&self, filesystem_id: &str) -> Result<(), CryptoError> {
        if self.failing_keys.lock().unwrap().contains(filesystem_id) {
            return Err(CryptoError::Backend("simulated keyring failure".into()));
        }
        self.fingerprints.lock().unwrap().remove(filesystem_id);
        Ok(())
    }
}

//=========================================================================================
// MemoryStorage
//=========================================================================================

#[derive(Default)]
pub struct MemoryStorage {
    dirs: Mutex<HashSet<String>>,
    files: Mutex<HashMap<(String, String), (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_dir(&self, filesystem_id: &str) -> bool {
        self.dirs.lock().unwrap().contains(filesystem_id)
    }

    /// Drop a reply ciphertext into the store, for test setup.
    pub fn put_reply(
        &self,
        filesystem_id: &str,
        filename: &str,
        contents: Vec<u8>,
        mtime: DateTime<Utc>,
    ) {
        self.files.lock().unwrap().insert(
            (filesystem_id.to_string(), filename.to_string()),
            (contents, mtime),
        );
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ensure_source_dir(&self, filesystem_id: &str) -> Result<(), StorageError> {
        self.dirs.lock().unwrap().insert(filesystem_id.to_string());
        Ok(())
    }

    async fn save_message(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        message: &str,
    ) -> Result<String, StorageError> {
        let filename = format!("{count}-{journalist_filename}-msg.gpg");
        self.files.lock().unwrap().insert(
            (filesystem_id.to_string(), filename.clone()),
            (message.as_bytes().to_vec(), Utc::now()),
        );
        Ok(filename)
    }

    async fn save_file(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        _original_filename: &str,
        contents: &[u8],
    ) -> Result<String, StorageError> {
        let filename = format!("{count}-{journalist_filename}-doc.gz.gpg");
        self.files.lock().unwrap().insert(
            (filesystem_id.to_string(), filename.clone()),
            (contents.to_vec(), Utc::now()),
        );
        Ok(filename)
    }

    async fn reply_bytes(
        &self,
        filesystem_id: &str,
        filename: &str,
    ) -> Result<(Vec<u8>, DateTime<Utc>), StorageError> {
        self.files
            .lock()
            .unwrap()
            .get(&(filesystem_id.to_string(), filename.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(filename.to_string()))
    }

    async fn normalize_timestamps(&self, _filesystem_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

//=========================================================================================
// RecordingChecksums
//=========================================================================================

#[derive(Default)]
pub struct RecordingChecksums {
    pub enqueued: Mutex<Vec<i64>>,
}

impl RecordingChecksums {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChecksumQueue for RecordingChecksums {
    fn enqueue(&self, submission: &Submission) {
        self.enqueued.lock().unwrap().push(submission.id);
    }
}
