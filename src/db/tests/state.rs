use crate::db::*;
use std::time::Duration;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_run_lock_is_exclusive() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(
        db.acquire_run_lock("run-a", Duration::from_secs(3600))
            .await
            .unwrap()
    );
    assert!(
        !db.acquire_run_lock("run-b", Duration::from_secs(3600))
            .await
            .unwrap(),
        "second owner must be refused while the lease is live"
    );
    assert_eq!(db.run_lock_owner().await.unwrap().as_deref(), Some("run-a"));

    db.close().await;
}

#[tokio::test]
async fn test_run_lock_owner_can_renew() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.acquire_run_lock("run-a", Duration::from_secs(60)).await.unwrap());
    assert!(db.acquire_run_lock("run-a", Duration::from_secs(60)).await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_expired_run_lock_can_be_taken_over() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Zero TTL expires immediately
    assert!(db.acquire_run_lock("crashed-run", Duration::ZERO).await.unwrap());
    assert!(
        db.acquire_run_lock("run-b", Duration::from_secs(60))
            .await
            .unwrap()
    );
    assert_eq!(db.run_lock_owner().await.unwrap().as_deref(), Some("run-b"));

    db.close().await;
}

#[tokio::test]
async fn test_release_only_affects_own_lease() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.acquire_run_lock("run-a", Duration::from_secs(60))
        .await
        .unwrap();
    db.release_run_lock("run-b").await.unwrap();
    assert_eq!(db.run_lock_owner().await.unwrap().as_deref(), Some("run-a"));

    db.release_run_lock("run-a").await.unwrap();
    assert_eq!(db.run_lock_owner().await.unwrap(), None);
    assert!(
        db.acquire_run_lock("run-b", Duration::from_secs(60))
            .await
            .unwrap()
    );

    db.close().await;
}

#[tokio::test]
async fn test_run_lock_expiry_has_millisecond_resolution() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(
        db.acquire_run_lock("run-a", Duration::from_millis(200))
            .await
            .unwrap()
    );
    assert!(
        !db.acquire_run_lock("run-b", Duration::from_secs(60))
            .await
            .unwrap()
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        db.acquire_run_lock("run-b", Duration::from_secs(60))
            .await
            .unwrap(),
        "lease must lapse once its TTL has passed"
    );

    db.close().await;
}
