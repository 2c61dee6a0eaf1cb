// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use docwire::Document;
use docwire::yrs::{GetString, Text, Transact};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Appends `value` to the document's "text" root.
pub async fn append_text(document: &Document, value: &str) {
    document
        .transact(|doc| {
            let text = doc.get_or_insert_text("text");
            let mut txn = doc.transact_mut();
            text.push(&mut txn, value);
        })
        .await;
}

/// Reads the document's "text" root.
pub async fn read_text(document: &Document) -> String {
    document
        .transact(|doc| {
            let text = doc.get_or_insert_text("text");
            let txn = doc.transact();
            text.get_string(&txn)
        })
        .await
}

/// Polls until the document's text equals `expected`.
pub async fn wait_for_text(document: &Document, expected: &str, timeout: Duration) {
    let reached = tokio::time::timeout(timeout, async {
        loop {
            if read_text(document).await == expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if reached.is_err() {
        panic!(
            "document did not reach {expected:?} in time, got {:?}",
            read_text(document).await
        );
    }
}

/// Lets in-flight messages drain, the closest equivalent of waiting for
/// all tasks to block.
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

/// Whether `needle` occurs in `haystack`.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
