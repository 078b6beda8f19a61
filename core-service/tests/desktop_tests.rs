#![cfg(feature = "desktop-shims")]

use bridge_traits::storage::LocalStore;
use core_service::{connect_desktop, ROOT_KEY};
use std::time::Duration;

#[tokio::test]
async fn test_grouping_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let client = connect_desktop("http://127.0.0.1:6600", dir.path())
        .await
        .unwrap();
    assert_eq!(client.resume("Genre").root, "Genre");

    let store = client.config().store.clone();
    let mut stored = None;
    for _ in 0..50 {
        stored = store.get_string(ROOT_KEY).await.unwrap();
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored.as_deref(), Some("Genre"));
    drop(client);

    let client = connect_desktop("http://127.0.0.1:6600", dir.path())
        .await
        .unwrap();
    assert_eq!(
        client
            .config()
            .store
            .get_string(ROOT_KEY)
            .await
            .unwrap()
            .as_deref(),
        Some("Genre")
    );
    assert!(dir.path().join("state.db").exists());
    assert!(dir.path().join("library.db").exists());
}

#[tokio::test]
async fn test_rejects_invalid_base_url() {
    let dir = tempfile::tempdir().unwrap();
    assert!(connect_desktop("ftp://daemon", dir.path()).await.is_err());
}
