// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server configuration loadable from files or the environment, an
//! alternative to constructing wire options in code.

use serde::{Deserialize, Serialize};

/// Default port a websocket server binds to.
pub const DEFAULT_BIND_PORT: u16 = 1234;

/// Configuration parameters for a document server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind the listener to.
    pub host: String,

    /// Port to bind the listener to. Port 0 picks a free port, observable
    /// through the server handle afterwards.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: DEFAULT_BIND_PORT,
        }
    }
}
