// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared document handle.
//!
//! A [`Document`] owns the CRDT state that a provider or room keeps in
//! sync. All access goes through a scoped transaction (an async lock
//! around the underlying [`yrs::Doc`]); committing a transaction that
//! changed the document publishes the encoded update on a broadcast
//! stream which update emitters subscribe to.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{ReadTxn, StateVector, Transact, Update};

use crate::message::{ProtocolError, SyncMessage};

/// Capacity of the update event stream. Subscribers which fall further
/// behind than this are lagged and skip the missed updates.
const UPDATE_STREAM_CAPACITY: usize = 512;

/// A cloneable handle to a CRDT-backed shared document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    doc: Mutex<yrs::Doc>,
    updates: broadcast::Sender<Vec<u8>>,
    _subscription: yrs::Subscription,
}

impl Document {
    /// Returns a new, empty document.
    pub fn new() -> Self {
        Self::from_doc(yrs::Doc::new())
    }

    /// Wraps an existing [`yrs::Doc`].
    pub fn from_doc(doc: yrs::Doc) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_STREAM_CAPACITY);
        let updates_tx = updates.clone();
        let subscription = doc
            .observe_update_v1(move |_txn, event| {
                // Send only fails when no emitter is subscribed, which is
                // the case for every update covered by the handshake.
                let _ = updates_tx.send(event.update.clone());
            })
            .expect("no transaction can be active on an unshared document");
        Self {
            inner: Arc::new(DocumentInner {
                doc: Mutex::new(doc),
                updates,
                _subscription: subscription,
            }),
        }
    }

    /// Runs `f` inside a scoped transaction on the underlying document.
    ///
    /// The closure receives the [`yrs::Doc`] and may open read or write
    /// transactions on it; updates committed by the closure are published
    /// to subscribers before `transact` returns.
    pub async fn transact<T>(&self, f: impl FnOnce(&yrs::Doc) -> T) -> T {
        let doc = self.inner.doc.lock().await;
        f(&doc)
    }

    /// Subscribes to the stream of encoded updates committed to this
    /// document.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inner.updates.subscribe()
    }

    /// Builds the step 1 message summarizing what this document knows.
    pub async fn sync_step1(&self) -> SyncMessage {
        let doc = self.inner.doc.lock().await;
        let state_vector = doc.transact().state_vector().encode_v1();
        SyncMessage::Step1(state_vector)
    }

    /// Handles an inbound sync message, returning the reply to send back,
    /// if any.
    ///
    /// Step 1 produces a step 2 reply with the updates the remote is
    /// missing; step 2 and update messages are applied and produce no
    /// reply.
    pub async fn handle_sync_message(
        &self,
        message: SyncMessage,
    ) -> Result<Option<SyncMessage>, ProtocolError> {
        let doc = self.inner.doc.lock().await;
        match message {
            SyncMessage::Step1(state_vector) => {
                let state_vector = StateVector::decode_v1(&state_vector)
                    .map_err(|err| ProtocolError::Payload(err.to_string()))?;
                let diff = doc.transact().encode_state_as_update_v1(&state_vector);
                Ok(Some(SyncMessage::Step2(diff)))
            }
            SyncMessage::Step2(update) | SyncMessage::Update(update) => {
                apply_update(&doc, &update)?;
                Ok(None)
            }
        }
    }

    /// Applies an encoded update to the document.
    pub async fn apply_update(&self, update: &[u8]) -> Result<(), ProtocolError> {
        let doc = self.inner.doc.lock().await;
        apply_update(&doc, update)
    }

    /// Encodes the entire document state as a single update.
    pub async fn merged_update(&self) -> Vec<u8> {
        let doc = self.inner.doc.lock().await;
        doc.transact()
            .encode_state_as_update_v1(&StateVector::default())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}

fn apply_update(doc: &yrs::Doc, update: &[u8]) -> Result<(), ProtocolError> {
    let update =
        Update::decode_v1(update).map_err(|err| ProtocolError::Payload(err.to_string()))?;
    doc.transact_mut()
        .apply_update(update)
        .map_err(|err| ProtocolError::Apply(err.to_string()))
}

#[cfg(test)]
mod tests {
    use yrs::{GetString, Text, Transact};

    use super::*;

    async fn write_text(document: &Document, value: &str) {
        document
            .transact(|doc| {
                let text = doc.get_or_insert_text("text");
                let mut txn = doc.transact_mut();
                text.push(&mut txn, value);
            })
            .await;
    }

    async fn read_text(document: &Document) -> String {
        document
            .transact(|doc| {
                let text = doc.get_or_insert_text("text");
                let txn = doc.transact();
                text.get_string(&txn)
            })
            .await
    }

    #[tokio::test]
    async fn step1_reply_carries_missing_updates() {
        let local = Document::new();
        let remote = Document::new();
        write_text(&remote, "Hello").await;

        assert!(matches!(local.sync_step1().await, SyncMessage::Step1(_)));

        let reply = remote
            .handle_sync_message(local.sync_step1().await)
            .await
            .unwrap()
            .expect("step 1 always produces a reply");
        assert!(matches!(reply, SyncMessage::Step2(_)));

        assert_eq!(local.handle_sync_message(reply).await.unwrap(), None);
        assert_eq!(read_text(&local).await, "Hello");
    }

    #[tokio::test]
    async fn committed_updates_reach_subscribers() {
        let document = Document::new();
        let mut events = document.subscribe();
        write_text(&document, "Hello").await;

        let update = events.recv().await.unwrap();
        let other = Document::new();
        other.apply_update(&update).await.unwrap();
        assert_eq!(read_text(&other).await, "Hello");
    }

    #[tokio::test]
    async fn duplicate_updates_produce_no_events() {
        let document = Document::new();
        let mut events = document.subscribe();
        write_text(&document, "Hello").await;
        let update = events.recv().await.unwrap();

        document.apply_update(&update).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn malformed_update_is_rejected() {
        let document = Document::new();
        assert!(matches!(
            document.apply_update(&[0xff, 0xff, 0xff]).await,
            Err(ProtocolError::Payload(_))
        ));
    }
}
