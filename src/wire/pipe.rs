// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process pipe wire.
//!
//! Identical to the memory wire except that the server hands out
//! pre-wired connections through [`Server::connect`], so the client can
//! be constructed around an existing connection object.

use std::sync::Arc;

use crate::client::{Client, ConnectOptions};
use crate::error::Error;
use crate::registry::WireRegistry;
use crate::room::RoomManager;
use crate::server::{BindOptions, Server};
use crate::wire::memory::MemoryChannel;
use crate::wire::{ServerWireOptions, WireOptions};

pub(crate) fn register(registry: &WireRegistry) {
    registry.register_client("pipe", Arc::new(|options| Box::pin(connect_pipe(options))));
    registry.register_server("pipe", Arc::new(|options| Box::pin(bind_pipe(options))));
}

/// A peer connection handed out by [`Server::connect`], already attached
/// to a room on the server side.
#[derive(Debug)]
pub struct PipeConnection {
    pub(crate) channel: Arc<MemoryChannel>,
}

/// Creates a channel pair, attaches the server half to the room named
/// `id` and returns the client half.
pub(crate) fn open(manager: Arc<RoomManager>, id: &str) -> PipeConnection {
    let (client_half, server_half) = MemoryChannel::pair();
    tokio::spawn(manager.serve(id.to_owned(), Arc::new(server_half)));
    PipeConnection {
        channel: Arc::new(client_half),
    }
}

async fn connect_pipe(options: ConnectOptions) -> Result<Client, Error> {
    let ConnectOptions {
        document,
        auto_push,
        auto_pull,
        wire,
        ..
    } = options;
    let WireOptions::Pipe { connection } = wire else {
        return Err(Error::InvalidWireOptions("pipe"));
    };

    let document = document.unwrap_or_default();
    Client::start(document, connection.channel, auto_push, auto_pull).await
}

async fn bind_pipe(options: BindOptions) -> Result<Server, Error> {
    if !matches!(options.wire, ServerWireOptions::Pipe) {
        return Err(Error::InvalidWireOptions("pipe"));
    }
    Ok(Server::in_process(options.room_factory))
}
