// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server construction: the `bind` entry point and the server handle.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::error::Error;
use crate::registry::WireRegistry;
use crate::room::{Room, RoomFactory, RoomManager};
use crate::wire::ServerWireOptions;
use crate::wire::pipe::PipeConnection;

/// Options accepted by [`bind`].
pub struct BindOptions {
    pub(crate) room_factory: Option<RoomFactory>,
    pub(crate) wire: ServerWireOptions,
}

impl BindOptions {
    /// Returns options for the given server wire with the default room
    /// factory.
    pub fn new(wire: impl Into<ServerWireOptions>) -> Self {
        Self {
            room_factory: None,
            wire: wire.into(),
        }
    }

    /// Constructs rooms through `factory` instead of building plain ones.
    pub fn room_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Room + Send + Sync + 'static,
    {
        self.room_factory = Some(Arc::new(factory));
        self
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        Self::new(ServerWireOptions::Memory)
    }
}

/// Binds a server on the named wire.
///
/// The returned handle keeps the server alive; dropping it stops
/// accepting peers and shuts every room down.
pub async fn bind(wire: &str, options: BindOptions) -> Result<Server, Error> {
    let factory = WireRegistry::global().server(wire)?;
    factory(options).await
}

/// A bound server.
pub struct Server {
    room_manager: Arc<RoomManager>,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    _listener: Option<AbortOnDropHandle<()>>,
}

impl Server {
    /// Server for the in-process wires, which attach peers through the
    /// handle instead of a listener.
    pub(crate) fn in_process(room_factory: Option<RoomFactory>) -> Self {
        let cancel = CancellationToken::new();
        let room_manager = Arc::new(RoomManager::new(room_factory, cancel.clone()));
        Self {
            room_manager,
            cancel,
            local_addr: None,
            _listener: None,
        }
    }

    /// Server accepting peers through a network listener task.
    pub(crate) fn listening(
        room_manager: Arc<RoomManager>,
        cancel: CancellationToken,
        local_addr: SocketAddr,
        listener: AbortOnDropHandle<()>,
    ) -> Self {
        Self {
            room_manager,
            cancel,
            local_addr: Some(local_addr),
            _listener: Some(listener),
        }
    }

    /// The registry of rooms currently served.
    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.room_manager
    }

    /// The address a listening wire is bound to, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Pipe wire: attaches a new peer to the room registered under `id`
    /// and returns the pre-wired connection for the client side.
    pub fn connect(&self, id: &str) -> PipeConnection {
        crate::wire::pipe::open(self.room_manager.clone(), id)
    }

    /// Stops accepting peers and shuts every room down.
    pub fn shutdown(self) {
        self.cancel.cancel();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
