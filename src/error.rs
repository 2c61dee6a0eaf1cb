// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

use crate::channel::ChannelError;
use crate::message::ProtocolError;

/// Top-level error type for `connect`, `bind` and session failures.
#[derive(Debug, Error)]
pub enum Error {
    /// No client factory is registered under the given wire name.
    #[error("No client found for \"{0}\", did you forget to install \"wire-{0}\"?")]
    ClientNotFound(String),

    /// No server factory is registered under the given wire name.
    #[error("No server found for \"{0}\", did you forget to install \"wire-{0}\"?")]
    ServerNotFound(String),

    /// The on-disk update log was written under a different format version.
    #[error("File version mismatch (got \"{got}\", expected \"{expected}\")")]
    FileVersionMismatch { got: String, expected: String },

    /// The wire options passed to `connect` or `bind` do not match the wire
    /// the factory was registered for.
    #[error("invalid options for wire \"{0}\"")]
    InvalidWireOptions(&'static str),

    /// The channel failed or closed before the handshake completed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A sync message could not be decoded or applied.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Filesystem failure while opening or writing the file wire's log.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
