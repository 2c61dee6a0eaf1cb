// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process memory wire.
//!
//! Both directions are unbounded FIFO queues. Connecting creates one
//! queue pair per peer: the client keeps one half, the server half is
//! attached to the room named by the client's id.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelError, ChannelStats};
use crate::client::{Client, ConnectOptions};
use crate::error::Error;
use crate::registry::WireRegistry;
use crate::server::{BindOptions, Server};
use crate::wire::{ServerWireOptions, WireOptions};

pub(crate) fn register(registry: &WireRegistry) {
    registry.register_client(
        "memory",
        Arc::new(|options| Box::pin(connect_memory(options))),
    );
    registry.register_server("memory", Arc::new(|options| Box::pin(bind_memory(options))));
}

async fn connect_memory(options: ConnectOptions) -> Result<Client, Error> {
    let ConnectOptions {
        id,
        document,
        auto_push,
        auto_pull,
        wire,
    } = options;
    let WireOptions::Memory { manager } = wire else {
        return Err(Error::InvalidWireOptions("memory"));
    };

    let (client_half, server_half) = MemoryChannel::pair();
    tokio::spawn(manager.serve(id, Arc::new(server_half)));

    let document = document.unwrap_or_default();
    Client::start(document, Arc::new(client_half), auto_push, auto_pull).await
}

async fn bind_memory(options: BindOptions) -> Result<Server, Error> {
    if !matches!(options.wire, ServerWireOptions::Memory) {
        return Err(Error::InvalidWireOptions("memory"));
    }
    Ok(Server::in_process(options.room_factory))
}

/// One half of an in-process channel pair.
#[derive(Debug)]
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    sent: AtomicUsize,
    received: AtomicUsize,
}

impl MemoryChannel {
    /// Returns two connected halves.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel::new(left_tx, right_rx),
            MemoryChannel::new(right_tx, left_rx),
        )
    }

    fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(inbound),
            sent: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, message: Vec<u8>) -> Result<(), ChannelError> {
        self.outbound
            .send(message)
            .map_err(|_| ChannelError::Closed)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        match self.inbound.lock().await.recv().await {
            Some(message) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                Ok(message)
            }
            None => Err(ChannelError::Closed),
        }
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
        }
    }
}
