// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire registry: maps a wire name to its client and server factories.
//!
//! Built-in wires are registered for every enabled cargo feature, so a
//! disabled feature behaves like an uninstalled wire package. External
//! wires register through [`WireRegistry::register_client`] and
//! [`WireRegistry::register_server`] and receive their options through
//! the `Custom` wire options variants.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use futures_util::future::BoxFuture;

use crate::client::{Client, ConnectOptions};
use crate::error::Error;
use crate::server::{BindOptions, Server};

/// Factory producing a connected client from its options.
pub type ClientFactory =
    std::sync::Arc<dyn Fn(ConnectOptions) -> BoxFuture<'static, Result<Client, Error>> + Send + Sync>;

/// Factory producing a bound server from its options.
pub type ServerFactory =
    std::sync::Arc<dyn Fn(BindOptions) -> BoxFuture<'static, Result<Server, Error>> + Send + Sync>;

/// Registry of wire name to client and server factories.
pub struct WireRegistry {
    clients: RwLock<HashMap<String, ClientFactory>>,
    servers: RwLock<HashMap<String, ServerFactory>>,
}

impl WireRegistry {
    fn with_builtins() -> Self {
        let registry = Self {
            clients: RwLock::new(HashMap::new()),
            servers: RwLock::new(HashMap::new()),
        };
        crate::wire::memory::register(&registry);
        crate::wire::pipe::register(&registry);
        #[cfg(feature = "file")]
        crate::wire::file::register(&registry);
        #[cfg(feature = "websocket")]
        crate::wire::websocket::register(&registry);
        registry
    }

    /// The process-wide registry consulted by [`connect`](crate::connect)
    /// and [`bind`](crate::bind).
    pub fn global() -> &'static WireRegistry {
        static REGISTRY: OnceLock<WireRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_builtins)
    }

    /// Registers (or replaces) the client factory for a wire name.
    pub fn register_client(&self, wire: &str, factory: ClientFactory) {
        self.clients
            .write()
            .expect("wire registry lock poisoned")
            .insert(wire.to_owned(), factory);
    }

    /// Registers (or replaces) the server factory for a wire name.
    pub fn register_server(&self, wire: &str, factory: ServerFactory) {
        self.servers
            .write()
            .expect("wire registry lock poisoned")
            .insert(wire.to_owned(), factory);
    }

    pub(crate) fn client(&self, wire: &str) -> Result<ClientFactory, Error> {
        self.clients
            .read()
            .expect("wire registry lock poisoned")
            .get(wire)
            .cloned()
            .ok_or_else(|| Error::ClientNotFound(wire.to_owned()))
    }

    pub(crate) fn server(&self, wire: &str) -> Result<ServerFactory, Error> {
        self.servers
            .read()
            .expect("wire registry lock poisoned")
            .get(wire)
            .cloned()
            .ok_or_else(|| Error::ServerNotFound(wire.to_owned()))
    }
}
