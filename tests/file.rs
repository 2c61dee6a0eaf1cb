// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::time::Duration;

use docwire::{ConnectOptions, Document, FileOptions, connect};
use tokio::time::sleep;

use common::{append_text, contains, read_text, settle, setup_logging};

#[tokio::test]
async fn updates_hit_the_disk_without_write_delay() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.y");

    let doc0 = Document::new();
    {
        let _client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path)).document(doc0.clone()),
        )
        .await
        .unwrap();
        append_text(&doc0, "Hello").await;
        settle().await;
    }
    assert!(contains(&std::fs::read(&path).unwrap(), b"Hello"));

    let doc1 = Document::new();
    {
        let _client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path)).document(doc1.clone()),
        )
        .await
        .unwrap();
    }
    assert_eq!(read_text(&doc1).await, "Hello");
}

#[tokio::test]
async fn write_delay_batches_appends() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.y");
    let header = b"0.0.0\x00";

    let doc = Document::new();
    let _client = connect(
        "file",
        ConnectOptions::new(
            FileOptions::new(&path).write_delay(Duration::from_millis(100)),
        )
        .document(doc.clone()),
    )
    .await
    .unwrap();

    for _ in 0..20 {
        append_text(&doc, ".").await;
        sleep(Duration::from_millis(10)).await;
    }
    // Every mutation rescheduled the pending write, so only the version
    // header is on disk so far.
    assert_eq!(std::fs::read(&path).unwrap(), header);

    sleep(Duration::from_millis(200)).await;
    let data = std::fs::read(&path).unwrap();
    assert!(data.starts_with(header));
    assert!(data.len() > header.len());
}

#[tokio::test]
async fn version_mismatch_fails_before_any_write() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.y");
    std::fs::write(&path, b"0.0.0\x00").unwrap();

    let err = connect(
        "file",
        ConnectOptions::new(FileOptions::new(&path).version("0.0.1")),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "File version mismatch (got \"0.0.0\", expected \"0.0.1\")"
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"0.0.0\x00");
}

#[tokio::test]
async fn squash_merges_the_log_on_open() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.y");

    {
        let client = connect("file", ConnectOptions::new(FileOptions::new(&path)))
            .await
            .unwrap();
        append_text(client.document(), "Hello").await;
        settle().await;
        append_text(client.document(), ", ").await;
        settle().await;
        append_text(client.document(), "World!").await;
        settle().await;
    }
    let data = std::fs::read(&path).unwrap();
    assert!(contains(&data, b"Hello"));
    assert!(contains(&data, b", "));
    assert!(contains(&data, b"World!"));
    assert!(!contains(&data, b"Hello, World!"));
    let size0 = data.len();

    // Opening without squashing leaves the log byte-for-byte alone.
    {
        let _client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path).squash(false)),
        )
        .await
        .unwrap();
    }
    let data = std::fs::read(&path).unwrap();
    assert_eq!(data.len(), size0);
    assert!(!contains(&data, b"Hello, World!"));

    // Squashing rewrites the log as one merged update.
    {
        let client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path).squash(true)),
        )
        .await
        .unwrap();
        assert_eq!(read_text(client.document()).await, "Hello, World!");
    }
    let data = std::fs::read(&path).unwrap();
    assert!(contains(&data, b"Hello, World!"));
    assert!(data.len() < size0);
    let size1 = data.len();

    // Updates made after a squash-open append as usual.
    {
        let client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path).squash(true)),
        )
        .await
        .unwrap();
        append_text(client.document(), " Goodbye.").await;
        settle().await;
    }
    let data = std::fs::read(&path).unwrap();
    assert!(data.len() > size1);
    assert!(contains(&data, b"Hello, World!"));
    assert!(contains(&data, b" Goodbye."));
    assert!(!contains(&data, b"Hello, World! Goodbye."));

    // A fresh document replays the full history.
    let doc = Document::new();
    {
        let _client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path)).document(doc.clone()),
        )
        .await
        .unwrap();
    }
    assert_eq!(read_text(&doc).await, "Hello, World! Goodbye.");
}

#[tokio::test]
async fn reopening_without_changes_leaves_the_size_unchanged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.y");

    let doc = Document::new();
    {
        let _client = connect(
            "file",
            ConnectOptions::new(FileOptions::new(&path)).document(doc.clone()),
        )
        .await
        .unwrap();
        append_text(&doc, "Hello").await;
        settle().await;
        append_text(&doc, ", World!").await;
        settle().await;
    }
    let size0 = std::fs::read(&path).unwrap().len();

    {
        let client = connect("file", ConnectOptions::new(FileOptions::new(&path)))
            .await
            .unwrap();
        assert_eq!(read_text(client.document()).await, "Hello, World!");
    }
    assert_eq!(std::fs::read(&path).unwrap().len(), size0);
}
