// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side rooms: one shared document, many peer channels.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::document::Document;
use crate::error::Error;
use crate::provider::{Provider, ProviderOptions};

/// Constructor stored on a [`RoomManager`], invoked once per room id.
///
/// The default factory produces a plain [`Room`]. Custom factories can
/// attach behavior to the room's lifetime via [`Room::spawn`], for
/// instance a room that itself connects as a client to an upstream server
/// to form a mesh.
pub type RoomFactory = Arc<dyn Fn(&str) -> Room + Send + Sync>;

/// A server session multiplexing peer channels onto one shared document.
///
/// Each attached peer is driven by its own provider-like session against
/// the room's document: the session answers the peer's step 1 with a
/// step 2, applies inbound updates, and forwards every document update
/// event to its peer in FIFO order. A room lives from the first peer
/// attaching until the last peer detaches.
#[derive(Debug)]
pub struct Room {
    id: String,
    document: Document,
    cancel: CancellationToken,
}

impl Room {
    /// Returns a room with a new, empty document.
    pub fn new(id: &str) -> Self {
        Self::with_document(id, Document::new())
    }

    /// Returns a room synchronizing an externally supplied document.
    pub fn with_document(id: &str, document: Document) -> Self {
        Self {
            id: id.to_owned(),
            document,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Spawns a task bound to the room's lifetime.
    ///
    /// The task is cancelled when the room shuts down, together with
    /// everything it owns.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = future => {}
            }
        });
    }

    /// Runs one peer session to completion.
    pub(crate) async fn serve(&self, channel: Arc<dyn Channel>) -> Result<(), Error> {
        let provider = Provider::new(
            self.document.clone(),
            channel,
            ProviderOptions::default(),
        );
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            result = provider.run() => result,
        }
    }

    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct RoomEntry {
    room: Arc<Room>,
    peers: usize,
}

/// Registry of room id to room, with lazy construction.
///
/// Mutations are serialized behind a lock: concurrent peers arriving for
/// the same id observe at most one room construction. A room is retained
/// while its peer count is positive and destroyed when the last peer
/// detaches.
pub struct RoomManager {
    rooms: Mutex<HashMap<String, RoomEntry>>,
    factory: RoomFactory,
    cancel: CancellationToken,
}

impl RoomManager {
    pub(crate) fn new(factory: Option<RoomFactory>, cancel: CancellationToken) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            factory: factory.unwrap_or_else(|| Arc::new(Room::new)),
            cancel,
        }
    }

    /// Returns the room registered under `id`, constructing it through the
    /// room factory if it does not exist yet.
    pub async fn get_or_create(&self, id: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        match rooms.get(id) {
            Some(entry) => entry.room.clone(),
            None => {
                let room = Arc::new((self.factory)(id));
                rooms.insert(
                    id.to_owned(),
                    RoomEntry {
                        room: room.clone(),
                        peers: 0,
                    },
                );
                room
            }
        }
    }

    /// Number of live rooms.
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// Attaches `channel` to the room registered under `id` and runs its
    /// peer session to completion, tearing the room down when its last
    /// peer detaches.
    pub(crate) async fn serve(self: Arc<Self>, id: String, channel: Arc<dyn Channel>) {
        let room = self.attach(&id).await;
        debug!(room = %id, "peer attached");

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            result = room.serve(channel) => {
                if let Err(err) = result {
                    warn!(room = %id, %err, "peer session failed");
                }
            }
        }

        self.release(&id).await;
    }

    /// Counts a peer onto the room registered under `id`, constructing
    /// the room through [`RoomManager::get_or_create`] if needed.
    async fn attach(&self, id: &str) -> Arc<Room> {
        loop {
            let room = self.get_or_create(id).await;
            let mut rooms = self.rooms.lock().await;
            match rooms.get_mut(id) {
                Some(entry) => {
                    entry.peers += 1;
                    break entry.room.clone();
                }
                // The room was torn down between the lookup and the
                // count; construct it again.
                None => {
                    drop(room);
                    continue;
                }
            }
        }
    }

    /// Releases one counted peer from the room registered under `id`,
    /// shutting the room down when its last peer is gone.
    async fn release(&self, id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get_mut(id) {
            entry.peers -= 1;
            if entry.peers == 0 {
                entry.room.shutdown();
                rooms.remove(id);
                debug!(room = %id, "last peer detached, room closed");
            }
        }
    }
}
