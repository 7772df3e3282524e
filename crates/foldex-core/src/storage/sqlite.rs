//! `SQLite` record backend.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite};
use tracing::debug;

use super::{RecordBackend, SaveBatch, SummaryHeader, UidRange};
use crate::record::{MessageRecord, SystemFlags, Uid, uid_cmp};
use crate::summary::Counters;
use crate::Result;

/// Record backend storing every folder in one `SQLite` database.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open the database at `database_path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let backend = Self { pool };
        backend.initialize().await?;
        Ok(backend)
    }

    /// Create an in-memory backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let backend = Self { pool };
        backend.initialize().await?;
        Ok(backend)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS summary_headers (
                folder TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                saved_at TEXT NOT NULL,
                counters TEXT NOT NULL,
                extra TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_records (
                folder TEXT NOT NULL,
                uid TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0,
                user_flags TEXT NOT NULL DEFAULT '[]',
                user_tags TEXT NOT NULL DEFAULT '{}',
                size INTEGER NOT NULL DEFAULT 0,
                sent_date TEXT,
                received_date TEXT,
                message_id TEXT,
                refs TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                from_addr TEXT NOT NULL DEFAULT '',
                to_addr TEXT NOT NULL DEFAULT '',
                cc_addr TEXT NOT NULL DEFAULT '',
                mlist TEXT NOT NULL DEFAULT '',
                headers TEXT NOT NULL DEFAULT '{}',
                UNIQUE(folder, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_records_folder
            ON message_records(folder)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    async fn put(&self, folder: &str, record: &MessageRecord) -> Result<()> {
        put_record(&self.pool, folder, record).await
    }

    async fn get_range(&self, folder: &str, range: &UidRange) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT uid, flags, user_flags, user_tags, size, sent_date, received_date,
                   message_id, refs, subject, from_addr, to_addr, cc_addr, mlist, headers
            FROM message_records
            WHERE folder = ?
            ",
        )
        .bind(folder)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let uid: String = row.get("uid");
            if range.contains(&uid) {
                records.push(row_to_record(row)?);
            }
        }
        records.sort_by(|a, b| uid_cmp(&a.uid, &b.uid));
        Ok(records)
    }

    async fn delete(&self, folder: &str, uids: &[Uid]) -> Result<()> {
        for uid in uids {
            delete_record(&self.pool, folder, uid).await?;
        }
        Ok(())
    }

    async fn header(&self, folder: &str) -> Result<Option<SummaryHeader>> {
        let row = sqlx::query(
            r"
            SELECT version, saved_at, counters, extra
            FROM summary_headers
            WHERE folder = ?
            ",
        )
        .bind(folder)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let saved_at: String = row.get("saved_at");
        let counters: String = row.get("counters");
        Ok(Some(SummaryHeader {
            version: u32::try_from(row.get::<i64, _>("version")).unwrap_or(u32::MAX),
            saved_at: parse_date(&saved_at).unwrap_or_default(),
            counters: serde_json::from_str::<Counters>(&counters)?,
            extra: row.get("extra"),
        }))
    }

    async fn set_header(&self, folder: &str, header: &SummaryHeader) -> Result<()> {
        put_header(&self.pool, folder, header).await
    }

    async fn commit(&self, folder: &str, batch: &SaveBatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in &batch.put {
            put_record(&mut *tx, folder, record).await?;
        }
        for uid in &batch.delete {
            delete_record(&mut *tx, folder, uid).await?;
        }
        put_header(&mut *tx, folder, &batch.header).await?;
        tx.commit().await?;

        debug!(
            folder,
            written = batch.put.len(),
            deleted = batch.delete.len(),
            "Committed summary"
        );
        Ok(())
    }
}

async fn put_record<'e, E>(executor: E, folder: &str, record: &MessageRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user_flags = serde_json::to_string(&record.user_flags)?;
    let user_tags = serde_json::to_string(&record.user_tags)?;
    let refs = serde_json::to_string(&record.references)?;
    let headers = serde_json::to_string(&record.headers)?;

    sqlx::query(
        r"
        INSERT INTO message_records
            (folder, uid, flags, user_flags, user_tags, size, sent_date, received_date,
             message_id, refs, subject, from_addr, to_addr, cc_addr, mlist, headers)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(folder, uid) DO UPDATE SET
            flags = excluded.flags,
            user_flags = excluded.user_flags,
            user_tags = excluded.user_tags,
            size = excluded.size,
            sent_date = excluded.sent_date,
            received_date = excluded.received_date,
            message_id = excluded.message_id,
            refs = excluded.refs,
            subject = excluded.subject,
            from_addr = excluded.from_addr,
            to_addr = excluded.to_addr,
            cc_addr = excluded.cc_addr,
            mlist = excluded.mlist,
            headers = excluded.headers
        ",
    )
    .bind(folder)
    .bind(&record.uid)
    .bind(i64::from(record.flags.bits()))
    .bind(user_flags)
    .bind(user_tags)
    .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
    .bind(record.sent_date.map(|d| d.to_rfc3339()))
    .bind(record.received_date.map(|d| d.to_rfc3339()))
    .bind(record.message_id.as_deref())
    .bind(refs)
    .bind(&record.subject)
    .bind(&record.from)
    .bind(&record.to)
    .bind(&record.cc)
    .bind(&record.mlist)
    .bind(headers)
    .execute(executor)
    .await?;

    Ok(())
}

async fn delete_record<'e, E>(executor: E, folder: &str, uid: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM message_records WHERE folder = ? AND uid = ?")
        .bind(folder)
        .bind(uid)
        .execute(executor)
        .await?;
    Ok(())
}

async fn put_header<'e, E>(executor: E, folder: &str, header: &SummaryHeader) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let counters = serde_json::to_string(&header.counters)?;

    sqlx::query(
        r"
        INSERT INTO summary_headers (folder, version, saved_at, counters, extra)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(folder) DO UPDATE SET
            version = excluded.version,
            saved_at = excluded.saved_at,
            counters = excluded.counters,
            extra = excluded.extra
        ",
    )
    .bind(folder)
    .bind(i64::from(header.version))
    .bind(header.saved_at.to_rfc3339())
    .bind(counters)
    .bind(&header.extra)
    .execute(executor)
    .await?;

    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<MessageRecord> {
    let user_flags: String = row.get("user_flags");
    let user_tags: String = row.get("user_tags");
    let refs: String = row.get("refs");
    let headers: String = row.get("headers");
    let sent: Option<String> = row.get("sent_date");
    let received: Option<String> = row.get("received_date");
    let flags = u32::try_from(row.get::<i64, _>("flags")).unwrap_or_default();

    Ok(MessageRecord {
        uid: row.get("uid"),
        flags: SystemFlags::from_bits_retain(flags),
        user_flags: serde_json::from_str::<BTreeSet<String>>(&user_flags)?,
        user_tags: serde_json::from_str::<BTreeMap<String, String>>(&user_tags)?,
        size: u64::try_from(row.get::<i64, _>("size")).unwrap_or_default(),
        sent_date: sent.as_deref().and_then(parse_date),
        received_date: received.as_deref().and_then(parse_date),
        message_id: row.get("message_id"),
        references: serde_json::from_str(&refs)?,
        subject: row.get("subject"),
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        cc: row.get("cc_addr"),
        mlist: row.get("mlist"),
        headers: serde_json::from_str(&headers)?,
    })
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
