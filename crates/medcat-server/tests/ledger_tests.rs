//! PostgreSQL ledger integration tests
//!
//! These use `#[sqlx::test]`, which needs `DATABASE_URL` pointing at a server
//! where a scratch database can be created. Run with `cargo test -- --ignored`.

use medcat_common::types::SnapshotStatus;
use medcat_server::ingest::ledger::{NewSnapshot, SnapshotUpdate};
use medcat_server::ingest::{DatasetSource, PgLedger, SnapshotLedger};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_register_source_is_idempotent(pool: PgPool) -> anyhow::Result<()> {
    let ledger = PgLedger::new(pool.clone());

    let first = ledger.register_source(DatasetSource::DailyMed, None).await?;
    let second = ledger
        .register_source(DatasetSource::DailyMed, Some("Drug labels"))
        .await?;
    assert_eq!(first, second);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dataset_sources")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);

    assert_eq!(ledger.source_id(DatasetSource::DailyMed).await?, Some(first));
    assert_eq!(ledger.source_id(DatasetSource::Seer).await?, None);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_update_keeps_unset_fields(pool: PgPool) -> anyhow::Result<()> {
    let ledger = PgLedger::new(pool);
    let source_id = ledger.register_source(DatasetSource::Nppes, None).await?;

    let id = ledger
        .insert_snapshot(NewSnapshot {
            source_id,
            status: SnapshotStatus::Pending,
            storage_location: "/data/nppes/nppes-1.zip".to_string(),
        })
        .await?;

    let pending = ledger.latest_snapshot(DatasetSource::Nppes).await?.unwrap();
    assert_eq!(pending.id, id);
    assert_eq!(pending.status, SnapshotStatus::Pending);
    assert_eq!(pending.metadata, json!({}));
    assert!(pending.completed_at.is_none());

    ledger
        .update_snapshot(
            id,
            SnapshotUpdate {
                status: SnapshotStatus::Failed,
                checksum: None,
                metadata: None,
                error: Some("Failed to download NPPES: 503".to_string()),
                storage_location: None,
            },
        )
        .await?;

    let failed = ledger.latest_snapshot(DatasetSource::Nppes).await?.unwrap();
    assert_eq!(failed.status, SnapshotStatus::Failed);
    assert_eq!(failed.storage_location, "/data/nppes/nppes-1.zip");
    assert_eq!(failed.error.as_deref(), Some("Failed to download NPPES: 503"));
    assert!(failed.completed_at.is_some());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore]
async fn test_latest_snapshot_and_listing(pool: PgPool) -> anyhow::Result<()> {
    let ledger = PgLedger::new(pool);
    let seer = ledger.register_source(DatasetSource::Seer, None).await?;
    ledger.register_source(DatasetSource::DailyMed, None).await?;

    let older = ledger
        .insert_snapshot(NewSnapshot {
            source_id: seer,
            status: SnapshotStatus::Pending,
            storage_location: "/data/seer/a.json".to_string(),
        })
        .await?;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let newer = ledger
        .insert_snapshot(NewSnapshot {
            source_id: seer,
            status: SnapshotStatus::Pending,
            storage_location: "/data/seer/b.json".to_string(),
        })
        .await?;
    ledger
        .update_snapshot(
            newer,
            SnapshotUpdate::completed(
                "ab".repeat(32),
                json!({ "itemCount": 1 }),
                "/data/seer/b.json".to_string(),
            ),
        )
        .await?;

    let latest = ledger.latest_snapshot(DatasetSource::Seer).await?.unwrap();
    assert_eq!(latest.id, newer);
    assert_ne!(latest.id, older);
    assert_eq!(latest.status, SnapshotStatus::Completed);
    assert_eq!(latest.metadata["itemCount"], 1);

    let sources = ledger.list_sources().await?;
    let names: Vec<&str> = sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["DailyMed", "SEER Program"]);
    assert!(sources[0].latest_snapshot.is_none());
    assert_eq!(sources[1].latest_snapshot.as_ref().map(|s| s.id), Some(newer));

    ledger.ping().await?;
    Ok(())
}
