// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bidirectional byte-message pipe produced by a wire.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The remote end closed the channel. Terminates iteration without
    /// being treated as a failure.
    #[error("channel closed by remote")]
    Closed,

    /// The underlying transport failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Snapshot of a channel's message counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Messages handed to `send` so far.
    pub sent: usize,
    /// Messages returned from `recv` so far.
    pub received: usize,
}

/// An ordered, reliable, bidirectional message pipe between two endpoints.
///
/// Messages are atomic byte strings; no fragmentation is defined at this
/// layer. Ordering is FIFO per direction. Wires that can lose messages
/// must reconnect and re-handshake instead of resuming a broken channel.
/// Iteration is a `recv` loop terminated by [`ChannelError::Closed`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Sends one message. Sends may be issued concurrently from several
    /// tasks; the wire serializes them onto the transport.
    async fn send(&self, message: Vec<u8>) -> Result<(), ChannelError>;

    /// Receives the next message.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Message counters. Wires without counters report zeros.
    fn stats(&self) -> ChannelStats {
        ChannelStats::default()
    }
}
