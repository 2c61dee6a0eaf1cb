// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in wires and their options.
//!
//! A wire is a named channel factory with matched client and server
//! sides. The in-process wires (memory, pipe) are always available; the
//! file and websocket wires are gated behind the cargo features of the
//! same name, mirroring separately installable wire packages.

use std::any::Any;
use std::sync::Arc;

use crate::room::RoomManager;
use crate::server::Server;

pub mod memory;
pub mod pipe;

#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "file")]
pub use file::FileOptions;
pub use pipe::PipeConnection;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketOptions, WebSocketServerOptions};

/// Wire-specific client options, passed through `connect`.
pub enum WireOptions {
    /// In-process queue pair attached to the given server's room manager.
    Memory { manager: Arc<RoomManager> },

    /// Pre-wired connection obtained from [`Server::connect`].
    Pipe { connection: PipeConnection },

    /// Append-log file wire.
    #[cfg(feature = "file")]
    File(FileOptions),

    /// Websocket wire.
    #[cfg(feature = "websocket")]
    WebSocket(WebSocketOptions),

    /// Options for an externally registered wire.
    Custom(Box<dyn Any + Send>),
}

impl WireOptions {
    /// Options connecting to an in-process memory server.
    pub fn memory(server: &Server) -> Self {
        WireOptions::Memory {
            manager: server.room_manager().clone(),
        }
    }

    /// Options wrapping a pipe connection handed out by the server.
    pub fn pipe(connection: PipeConnection) -> Self {
        WireOptions::Pipe { connection }
    }
}

impl std::fmt::Debug for WireOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WireOptions::Memory { .. } => "Memory",
            WireOptions::Pipe { .. } => "Pipe",
            #[cfg(feature = "file")]
            WireOptions::File(_) => "File",
            #[cfg(feature = "websocket")]
            WireOptions::WebSocket(_) => "WebSocket",
            WireOptions::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "file")]
impl From<FileOptions> for WireOptions {
    fn from(options: FileOptions) -> Self {
        WireOptions::File(options)
    }
}

#[cfg(feature = "websocket")]
impl From<WebSocketOptions> for WireOptions {
    fn from(options: WebSocketOptions) -> Self {
        WireOptions::WebSocket(options)
    }
}

impl From<PipeConnection> for WireOptions {
    fn from(connection: PipeConnection) -> Self {
        WireOptions::pipe(connection)
    }
}

/// Wire-specific server options, passed through `bind`.
pub enum ServerWireOptions {
    /// In-process memory server; takes no options.
    Memory,

    /// In-process pipe server; takes no options.
    Pipe,

    /// Websocket listener.
    #[cfg(feature = "websocket")]
    WebSocket(WebSocketServerOptions),

    /// Options for an externally registered wire.
    Custom(Box<dyn Any + Send>),
}

#[cfg(feature = "websocket")]
impl From<WebSocketServerOptions> for ServerWireOptions {
    fn from(options: WebSocketServerOptions) -> Self {
        ServerWireOptions::WebSocket(options)
    }
}
