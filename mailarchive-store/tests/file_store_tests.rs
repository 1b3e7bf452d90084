#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{path::PathBuf, sync::Arc};

use mailarchive_store::{FileMessageStore, MessageStore, MessageStoreConfig};
use uuid::Uuid;

#[test]
fn test_path_validation_rejects_parent_dir() {
    let result = FileMessageStore::builder()
        .path(PathBuf::from("/var/lib/../etc/passwd"))
        .build();

    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("cannot contain '..'")
    );
}

#[test]
fn test_path_validation_rejects_relative_paths() {
    let result = FileMessageStore::builder()
        .path(PathBuf::from("relative/path"))
        .build();

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("must be absolute"));
}

#[test]
#[cfg(unix)]
fn test_path_validation_rejects_system_directories() {
    for path in ["/etc/mail", "/bin/messages", "/usr/sbin/mail", "/proc/mail", "/dev/mail"] {
        let result = FileMessageStore::builder().path(PathBuf::from(path)).build();

        assert!(result.is_err(), "Path {path} should be rejected but wasn't");
        assert!(
            result.unwrap_err().to_string().contains("system directory"),
            "Wrong error for path {path}"
        );
    }
}

#[test]
#[cfg(unix)]
fn test_path_validation_accepts_valid_paths() {
    for path in ["/var/lib/mailarchive", "/srv/mail/archive", "/tmp/messages"] {
        assert!(
            FileMessageStore::builder().path(PathBuf::from(path)).build().is_ok(),
            "Path {path} should be accepted"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_writers_from_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn MessageStore> = MessageStoreConfig::File {
        path: dir.path().join("store"),
    }
    .into_store()
    .expect("file store");

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let id = Uuid::new_v4();
                let body = format!("Subject: {i}\r\n\r\nbody {i}\r\n");
                store.put(id, body.as_bytes()).await.map(|()| (id, body))
            })
        })
        .collect();

    for handle in handles {
        let (id, body) = handle.await.expect("task").expect("put");
        assert_eq!(store.get(id).await.expect("get"), body.into_bytes());
    }
}
