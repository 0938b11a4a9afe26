use crate::store::Store;
use crate::store::tests::new_record;
use crate::types::RecordId;
use tempfile::NamedTempFile;

#[tokio::test]
async fn fresh_store_lands_on_latest_schema_version() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = Store::open(temp_file.path()).await.unwrap();

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(version, 2);

    store.close().await;
}

#[tokio::test]
async fn reopening_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let store = Store::open(temp_file.path()).await.unwrap();
        store.commit_batch("src", &[new_record(1)]).await.unwrap();
        store.close().await;
    }

    // Second open must not re-apply migrations or disturb data
    let store = Store::open(temp_file.path()).await.unwrap();
    assert_eq!(store.record_count().await.unwrap(), 1);

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1, 2]);

    store.close().await;
}

#[tokio::test]
async fn metric_columns_default_to_null() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = Store::open(temp_file.path()).await.unwrap();

    store.commit_batch("src", &[new_record(7)]).await.unwrap();

    let record = store.get_record(RecordId(7)).await.unwrap().unwrap();
    assert_eq!(record.post_author, None);
    assert_eq!(record.views, None);
    assert_eq!(record.forwards, None);
    assert_eq!(record.reactions, None);
    assert_eq!(record.media_path, None);

    store.close().await;
}
