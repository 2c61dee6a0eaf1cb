// SPDX-License-Identifier: MIT OR Apache-2.0

//! File wire: synchronizes a document with an on-disk append log.
//!
//! The log starts with a UTF-8 version string terminated by a single zero
//! byte, followed by concatenated length-prefixed update records. The
//! wire behaves like a peer whose state is the union of all previously
//! appended updates: on open the records are replayed into a private
//! file-doc and a step 1 built from it is injected as the first inbound
//! message, after which the provider handshakes with the file as it would
//! with any remote.
//!
//! Outbound update payloads are batched and appended after `write_delay`
//! has elapsed without further updates. Appends, the version header and
//! the squash rewrite run on detached tasks so that a cancelled provider
//! can never leave a partial record behind.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, warn};

use crate::channel::{Channel, ChannelError};
use crate::client::{Client, ConnectOptions};
use crate::document::Document;
use crate::error::Error;
use crate::message::{self, RecordReader, SyncMessage};
use crate::registry::WireRegistry;
use crate::wire::WireOptions;

pub(crate) fn register(registry: &WireRegistry) {
    registry.register_client("file", Arc::new(|options| Box::pin(connect_file(options))));
}

/// Client options for the file wire.
#[derive(Debug, Clone)]
pub struct FileOptions {
    pub(crate) path: PathBuf,
    pub(crate) write_delay: Duration,
    pub(crate) version: String,
    pub(crate) squash: bool,
}

impl FileOptions {
    /// Returns options for the log at `path` with no write delay, version
    /// `"0.0.0"` and squashing disabled.
    pub fn new(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_delay: Duration::ZERO,
            version: "0.0.0".to_owned(),
            squash: false,
        }
    }

    /// Delays appends until this long has passed without further updates,
    /// batching them into one write.
    pub fn write_delay(mut self, write_delay: Duration) -> Self {
        self.write_delay = write_delay;
        self
    }

    /// Version string expected in the log header. Opening a log written
    /// under any other version fails before any write.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Rewrites the log as a single merged update on open, shrinking logs
    /// that accumulated many small updates.
    pub fn squash(mut self, squash: bool) -> Self {
        self.squash = squash;
        self
    }
}

async fn connect_file(options: ConnectOptions) -> Result<Client, Error> {
    let ConnectOptions {
        document,
        auto_push,
        auto_pull,
        wire,
        ..
    } = options;
    let WireOptions::File(file_options) = wire else {
        return Err(Error::InvalidWireOptions("file"));
    };

    let file_doc = Document::new();
    let existing = match tokio::fs::read(&file_options.path).await {
        Ok(data) => Some(data),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(err.into()),
    };

    if let Some(data) = &existing {
        let payload = check_version(data, &file_options.version)?;
        let mut records = RecordReader::new(payload);
        while let Some(record) = records.next_record() {
            if let Err(err) = file_doc.apply_update(record).await {
                warn!(%err, "skipping unreadable update record");
            }
        }
    }

    let mut header = file_options.version.clone().into_bytes();
    header.push(0);

    let file = if existing.is_some() && file_options.squash {
        // Truncate, then header, then the merged record: an interrupted
        // squash leaves a log the next open can still replay or reject.
        let merged = file_doc.merged_update().await;
        let path = file_options.path.clone();
        shielded(async move {
            let mut file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .await?;
            file.write_all(&header).await?;
            let mut record = Vec::with_capacity(merged.len() + 8);
            message::write_record(&mut record, &merged);
            file.write_all(&record).await?;
            file.flush().await?;
            Ok(file)
        })
        .await?
    } else if existing.is_some() {
        OpenOptions::new().append(true).open(&file_options.path).await?
    } else {
        let path = file_options.path.clone();
        shielded(async move {
            let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
            file.write_all(&header).await?;
            file.flush().await?;
            Ok(file)
        })
        .await?
    };

    let (replies, inbound) = mpsc::unbounded_channel();
    let step1 = file_doc.sync_step1().await;
    replies
        .send(step1.encode())
        .expect("receiver is held by the file channel");

    let channel = Arc::new(FileChannel {
        replies,
        inbound: Mutex::new(inbound),
        file: Arc::new(Mutex::new(file)),
        file_doc: Mutex::new(Some(file_doc)),
        batch: Arc::new(Mutex::new(Vec::new())),
        pending: Mutex::new(None),
        write_delay: file_options.write_delay,
    });

    let document = document.unwrap_or_default();
    Client::start(document, channel, auto_push, auto_pull).await
}

/// Splits the log into version header and record payload, verifying the
/// version before anything is written.
fn check_version<'a>(data: &'a [u8], expected: &str) -> Result<&'a [u8], Error> {
    let Some(zero) = data.iter().position(|byte| *byte == 0) else {
        return Err(Error::FileVersionMismatch {
            got: String::from_utf8_lossy(data).into_owned(),
            expected: expected.to_owned(),
        });
    };
    let version = String::from_utf8_lossy(&data[..zero]);
    if version != expected {
        return Err(Error::FileVersionMismatch {
            got: version.into_owned(),
            expected: expected.to_owned(),
        });
    }
    Ok(&data[zero + 1..])
}

/// Runs a write on a detached task so it completes even if the calling
/// task is cancelled.
async fn shielded<T: Send + 'static>(
    write: impl Future<Output = std::io::Result<T>> + Send + 'static,
) -> std::io::Result<T> {
    tokio::spawn(write).await.expect("shielded write panicked")
}

/// The provider-facing side of the file wire.
///
/// Inbound messages are the synthesized step 1 and any replies produced
/// by the file-doc; outbound messages are inspected and either appended
/// (updates) or handshaken against the file-doc (step 1 and 2).
struct FileChannel {
    replies: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    file: Arc<Mutex<File>>,
    file_doc: Mutex<Option<Document>>,
    batch: Arc<Mutex<Vec<u8>>>,
    pending: Mutex<Option<AbortOnDropHandle<()>>>,
    write_delay: Duration,
}

impl FileChannel {
    /// (Re)starts the debounced append. A pending timer that has not
    /// fired yet is cancelled so the batch keeps accumulating.
    async fn schedule_write(&self) {
        let mut pending = self.pending.lock().await;
        pending.take();

        let batch = self.batch.clone();
        let file = self.file.clone();
        let write_delay = self.write_delay;
        *pending = Some(AbortOnDropHandle::new(tokio::spawn(async move {
            tokio::time::sleep(write_delay).await;
            let data = std::mem::take(&mut *batch.lock().await);
            if data.is_empty() {
                return;
            }
            // No await between taking the batch and detaching the write,
            // so cancellation cannot drop or tear the records.
            let write = tokio::spawn(async move {
                let mut file = file.lock().await;
                if let Err(err) = file.write_all(&data).await {
                    error!(%err, "failed to append update records");
                } else if let Err(err) = file.flush().await {
                    error!(%err, "failed to flush update records");
                }
            });
            let _ = write.await;
        })));
    }
}

#[async_trait]
impl Channel for FileChannel {
    async fn send(&self, message: Vec<u8>) -> Result<(), ChannelError> {
        if message.first() != Some(&message::MESSAGE_SYNC) {
            warn!("dropping non-sync message");
            return Ok(());
        }
        match message.get(1) {
            Some(&message::SYNC_UPDATE) => {
                // The message body past the two type bytes is already a
                // length-prefixed record.
                self.batch.lock().await.extend_from_slice(&message[2..]);
                self.schedule_write().await;
            }
            Some(&message::SYNC_STEP1) | Some(&message::SYNC_STEP2) => {
                let mut file_doc = self.file_doc.lock().await;
                if let Some(doc) = file_doc.as_ref() {
                    match SyncMessage::decode(&message) {
                        Ok(decoded) => match doc.handle_sync_message(decoded).await {
                            Ok(Some(reply)) => {
                                let _ = self.replies.send(reply.encode());
                            }
                            Ok(None) => {}
                            Err(err) => warn!(%err, "dropping sync message for the file log"),
                        },
                        Err(err) => warn!(%err, "dropping malformed sync message"),
                    }
                }
                if message[1] == message::SYNC_STEP2 {
                    // Handshake done, no further need for the file-doc.
                    *file_doc = None;
                }
            }
            _ => warn!("dropping unknown sync message"),
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_check_splits_header_from_records() {
        let mut data = b"0.0.0".to_vec();
        data.push(0);
        data.extend_from_slice(b"records");
        assert_eq!(check_version(&data, "0.0.0").unwrap(), b"records");
    }

    #[test]
    fn version_mismatch_names_both_versions() {
        let mut data = b"0.0.0".to_vec();
        data.push(0);
        let err = check_version(&data, "0.0.1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "File version mismatch (got \"0.0.0\", expected \"0.0.1\")"
        );
    }

    #[test]
    fn missing_header_is_a_version_mismatch() {
        let err = check_version(b"garbage", "0.0.0").unwrap_err();
        assert!(matches!(err, Error::FileVersionMismatch { .. }));
    }
}
