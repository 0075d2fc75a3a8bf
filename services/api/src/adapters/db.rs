//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `IdentityStore` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.
//!
//! Every mutating operation is one commit-or-rollback transaction. The
//! intake reservation carries an optimistic guard on the interaction
//! counter so two concurrent intakes for the same identity cannot both
//! claim the same sequence numbers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tipline_core::domain::{NewSource, Reply, Source, Submission};
use tipline_core::ports::{IdentityStore, StoreError};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A SQLite-backed adapter that implements the `IdentityStore` port.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new `SqliteStore`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Resolve a source's filesystem id from its internal key. Used by
    /// the checksum worker, which only holds submission rows.
    pub async fn source_filesystem_id(&self, source_id: i64) -> Result<String, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT filesystem_id FROM sources WHERE id = ?")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        row.map(|(fsid,)| fsid)
            .ok_or_else(|| StoreError::NotFound(format!("source {source_id}")))
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SourceRecord {
    id: i64,
    uuid: String,
    filesystem_id: String,
    journalist_designation: String,
    pending: bool,
    interaction_count: i64,
    last_updated: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SourceRecord {
    fn to_domain(self) -> Result<Source, StoreError> {
        Ok(Source {
            id: self.id,
            uuid: parse_uuid(&self.uuid)?,
            filesystem_id: self.filesystem_id,
            journalist_designation: self.journalist_designation,
            pending: self.pending,
            interaction_count: self.interaction_count,
            last_updated: self.last_updated,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SubmissionRecord {
    id: i64,
    uuid: String,
    source_id: i64,
    filename: String,
    checksum: Option<String>,
}

impl SubmissionRecord {
    fn to_domain(self) -> Result<Submission, StoreError> {
        Ok(Submission {
            id: self.id,
            uuid: parse_uuid(&self.uuid)?,
            source_id: self.source_id,
            filename: self.filename,
            checksum: self.checksum,
        })
    }
}

#[derive(FromRow)]
struct ReplyRecord {
    id: i64,
    uuid: String,
    source_id: i64,
    filename: String,
    deleted_by_source: bool,
}

impl ReplyRecord {
    fn to_domain(self) -> Result<Reply, StoreError> {
        Ok(Reply {
            id: self.id,
            uuid: parse_uuid(&self.uuid)?,
            source_id: self.source_id,
            filename: self.filename,
            deleted_by_source: self.deleted_by_source,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Backend(format!("corrupt uuid column: {e}")))
}

const SOURCE_COLUMNS: &str = "id, uuid, filesystem_id, journalist_designation, \
     pending, interaction_count, last_updated, created_at";

//=========================================================================================
// `IdentityStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn create_source(&self, new: NewSource) -> Result<Source, StoreError> {
        let uuid = Uuid::new_v4();
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sources (uuid, filesystem_id, journalist_designation, \
             pending, interaction_count, created_at) VALUES (?, ?, ?, 1, 0, ?)",
        )
        .bind(uuid.to_string())
        .bind(&new.filesystem_id)
        .bind(&new.journalist_designation)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        let done = match result {
            Ok(done) => done,
            Err(err) if is_unique_violation(&err) => return Err(StoreError::DuplicateIdentity),
            Err(err) => return Err(backend(err)),
        };

        Ok(Source {
            id: done.last_insert_rowid(),
            uuid,
            filesystem_id: new.filesystem_id,
            journalist_designation: new.journalist_designation,
            pending: true,
            interaction_count: 0,
            last_updated: None,
            created_at,
        })
    }

    async fn find_by_filesystem_id(
        &self,
        filesystem_id: &str,
    ) -> Result<Option<Source>, StoreError> {
        let record: Option<SourceRecord> = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE filesystem_id = ?"
        ))
        .bind(filesystem_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        record.map(SourceRecord::to_domain).transpose()
    }

    async fn find_or_create(&self, new: NewSource) -> Result<Source, StoreError> {
        if let Some(existing) = self.find_by_filesystem_id(&new.filesystem_id).await? {
            return Ok(existing);
        }
        match self.create_source(new.clone()).await {
            // Lost a create race; the row exists now.
            Err(StoreError::DuplicateIdentity) => self
                .find_by_filesystem_id(&new.filesystem_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(new.filesystem_id)),
            other => other,
        }
    }

    async fn reserve_intake(
        &self,
        source_id: i64,
        expected_count: i64,
        units: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Optimistic counter guard: only the intake that read
        // `expected_count` may advance it. A single statement, so the
        // reservation is atomic against concurrent intakes.
        let updated = sqlx::query(
            "UPDATE sources SET interaction_count = interaction_count + ?, \
             pending = 0, last_updated = ? WHERE id = ? AND interaction_count = ?",
        )
        .bind(units)
        .bind(now)
        .bind(source_id)
        .bind(expected_count)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM sources WHERE id = ?")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
            return Err(match exists {
                Some(_) => StoreError::Conflict,
                None => StoreError::NotFound(format!("source {source_id}")),
            });
        }
        Ok(())
    }

    async fn record_submissions(
        &self,
        source_id: i64,
        filenames: &[String],
    ) -> Result<Vec<Submission>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let mut created = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let uuid = Uuid::new_v4();
            let done = sqlx::query(
                "INSERT INTO submissions (uuid, source_id, filename) VALUES (?, ?, ?)",
            )
            .bind(uuid.to_string())
            .bind(source_id)
            .bind(filename)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            created.push(Submission {
                id: done.last_insert_rowid(),
                uuid,
                source_id,
                filename: filename.clone(),
                checksum: None,
            });
        }

        tx.commit().await.map_err(backend)?;
        Ok(created)
    }

    async fn find_non_deleted_replies(&self, source_id: i64) -> Result<Vec<Reply>, StoreError> {
        let records: Vec<ReplyRecord> = sqlx::query_as(
            "SELECT id, uuid, source_id, filename, deleted_by_source FROM replies \
             WHERE source_id = ? AND deleted_by_source = 0 ORDER BY id",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        records.into_iter().map(ReplyRecord::to_domain).collect()
    }

    async fn find_reply_owned(
        &self,
        source_id: i64,
        filename: &str,
    ) -> Result<Reply, StoreError> {
        let record: Option<ReplyRecord> = sqlx::query_as(
            "SELECT id, uuid, source_id, filename, deleted_by_source FROM replies \
             WHERE source_id = ? AND filename = ?",
        )
        .bind(source_id)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        record
            .ok_or_else(|| StoreError::NotFound(format!("reply {filename}")))?
            .to_domain()
    }

    async fn mark_reply_deleted(&self, reply_id: i64) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE replies SET deleted_by_source = 1 WHERE id = ?")
            .bind(reply_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reply id {reply_id}")));
        }
        Ok(())
    }

    async fn mark_all_replies_deleted(&self, source_id: i64) -> Result<usize, StoreError> {
        let done = sqlx::query(
            "UPDATE replies SET deleted_by_source = 1 \
             WHERE source_id = ? AND deleted_by_source = 0",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(done.rows_affected() as usize)
    }

    async fn find_pending_older_than_top_n(
        &self,
        keep_most_recent: usize,
    ) -> Result<Vec<Source>, StoreError> {
        let records: Vec<SourceRecord> = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE pending = 1 \
             ORDER BY id DESC LIMIT -1 OFFSET ?"
        ))
        .bind(keep_most_recent as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        records.into_iter().map(SourceRecord::to_domain).collect()
    }

    async fn delete_source_if_pending(&self, source_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Re-check `pending` at delete time; a submission may have just
        // flipped it.
        let deleted = sqlx::query("DELETE FROM sources WHERE id = ? AND pending = 1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM submissions WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM replies WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn attach_checksum(
        &self,
        submission_id: i64,
        checksum: &str,
    ) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE submissions SET checksum = ? WHERE id = ?")
            .bind(checksum)
            .bind(submission_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("submission id {submission_id}")));
        }
        Ok(())
    }
}
