use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    LedgerError, NewSnapshot, SnapshotLedger, SnapshotRecord, SnapshotUpdate, SourceRecord,
};
use crate::ingest::sources::DatasetSource;

/// PostgreSQL ledger over the `dataset_sources` / `dataset_snapshots` tables
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    source: String,
    status: String,
    storage_location: String,
    checksum: Option<String>,
    metadata: serde_json::Value,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SnapshotRow> for SnapshotRecord {
    type Error = LedgerError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(SnapshotRecord {
            id: row.id,
            source: row.source,
            status: row.status.parse()?,
            storage_location: row.storage_location,
            checksum: row.checksum,
            metadata: row.metadata,
            error: row.error,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i32,
    source: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    snap_id: Option<Uuid>,
    snap_status: Option<String>,
    snap_storage_location: Option<String>,
    snap_checksum: Option<String>,
    snap_metadata: Option<serde_json::Value>,
    snap_error: Option<String>,
    snap_created_at: Option<DateTime<Utc>>,
    snap_completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SourceRow> for SourceRecord {
    type Error = LedgerError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        let latest_snapshot = match (row.snap_id, row.snap_status, row.snap_created_at) {
            (Some(id), Some(status), Some(created_at)) => Some(SnapshotRecord {
                id,
                source: row.source.clone(),
                status: status.parse()?,
                storage_location: row.snap_storage_location.unwrap_or_default(),
                checksum: row.snap_checksum,
                metadata: row.snap_metadata.unwrap_or_else(|| serde_json::json!({})),
                error: row.snap_error,
                created_at,
                completed_at: row.snap_completed_at,
            }),
            _ => None,
        };

        Ok(SourceRecord {
            id: row.id,
            source: row.source,
            description: row.description,
            created_at: row.created_at,
            latest_snapshot,
        })
    }
}

#[async_trait]
impl SnapshotLedger for PgLedger {
    async fn register_source(
        &self,
        source: DatasetSource,
        description: Option<&str>,
    ) -> Result<i32, LedgerError> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO dataset_sources (source, description)
            VALUES ($1, $2)
            ON CONFLICT (source) DO UPDATE
                SET description = COALESCE(EXCLUDED.description, dataset_sources.description)
            RETURNING id
            "#,
        )
        .bind(source.as_str())
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn source_id(&self, source: DatasetSource) -> Result<Option<i32>, LedgerError> {
        let id = sqlx::query_scalar("SELECT id FROM dataset_sources WHERE source = $1")
            .bind(source.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Uuid, LedgerError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO dataset_snapshots (id, source_id, status, storage_location)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(snapshot.source_id)
        .bind(snapshot.status.as_str())
        .bind(&snapshot.storage_location)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_snapshot(&self, id: Uuid, update: SnapshotUpdate) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE dataset_snapshots
            SET status = $2,
                checksum = COALESCE($3, checksum),
                metadata = COALESCE($4::jsonb, metadata),
                error = $5,
                storage_location = COALESCE($6, storage_location),
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.checksum)
        .bind(update.metadata)
        .bind(update.error)
        .bind(update.storage_location)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::SnapshotNotFound(id));
        }
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        source: DatasetSource,
    ) -> Result<Option<SnapshotRecord>, LedgerError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT s.id, ds.source, s.status, s.storage_location, s.checksum,
                   s.metadata, s.error, s.created_at, s.completed_at
            FROM dataset_snapshots s
            INNER JOIN dataset_sources ds ON ds.id = s.source_id
            WHERE ds.source = $1
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SnapshotRecord::try_from).transpose()
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>, LedgerError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT ds.id, ds.source, ds.description, ds.created_at,
                   snap.id AS snap_id,
                   snap.status AS snap_status,
                   snap.storage_location AS snap_storage_location,
                   snap.checksum AS snap_checksum,
                   snap.metadata AS snap_metadata,
                   snap.error AS snap_error,
                   snap.created_at AS snap_created_at,
                   snap.completed_at AS snap_completed_at
            FROM dataset_sources ds
            LEFT JOIN LATERAL (
                SELECT * FROM dataset_snapshots s
                WHERE s.source_id = ds.id
                ORDER BY s.created_at DESC
                LIMIT 1
            ) snap ON TRUE
            ORDER BY ds.source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
