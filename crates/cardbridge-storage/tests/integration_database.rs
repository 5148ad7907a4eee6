//! Integration tests for the on-disk reading log.

use chrono::Utc;

use cardbridge_core::CardId;
use cardbridge_protocol::parse;
use cardbridge_storage::{
    Database, DatabaseConfig, NewReading, ReadingLogRepository, SqliteReadingLogRepository,
};

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("readings.db");
    let path = path.to_string_lossy().to_string();

    {
        let db = Database::new(DatabaseConfig::new(path.clone())).await.unwrap();
        let repo = SqliteReadingLogRepository::new(db.pool().clone());
        let reading = NewReading::from_event(&parse("UID:RF001234"), None, Utc::now());
        repo.record_reading(&reading).await.unwrap();
        db.close().await;
    }

    let db = Database::new(DatabaseConfig::new(path)).await.unwrap();
    let repo = SqliteReadingLogRepository::new(db.pool().clone());
    let readings = repo
        .readings_for_card(&CardId::new("RF001234"), 5)
        .await
        .unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].line, "UID:RF001234");
    db.close().await;
}
