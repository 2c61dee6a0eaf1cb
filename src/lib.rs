// SPDX-License-Identifier: MIT OR Apache-2.0

//! `docwire` is a wire-agnostic synchronization fabric for CRDT-backed
//! shared documents.
//!
//! A shared [`Document`] accepts concurrent local and remote mutations
//! and converges under merge. `docwire` connects participants over
//! pluggable byte-oriented *wires* (websocket, in-memory, bidirectional
//! pipe, an append-only file) so that every participant observes the
//! same converged state regardless of message ordering or transient
//! disconnection.
//!
//! On the client side a [`Provider`] drives the sync protocol over the
//! [`Channel`] produced by a wire: a two-step handshake (state vector
//! out, missing updates back) followed by live exchange of incremental
//! updates. On the server side a [`Room`] multiplexes many peer channels
//! onto one shared document and fans updates out to every peer, and a
//! [`RoomManager`] constructs rooms on demand and tears them down when
//! their last peer leaves.
//!
//! ## Wires
//!
//! Wires are looked up by name in a [`WireRegistry`]; the built-in wires
//! are compiled in through cargo features of the same name (all enabled
//! by default):
//!
//! - `memory`: in-process queue pairs, mainly for tests and embedding.
//! - `pipe`: like memory, but the server hands out pre-wired connections.
//! - `websocket`: binary frames over a websocket session.
//! - `file`: an append-only update log on disk, replayed on open and
//!   optionally squashed into a single merged update.
//!
//! ## Example
//!
//! ```no_run
//! use docwire::{BindOptions, ConnectOptions, WireOptions, bind, connect};
//! use docwire::yrs::{Text, Transact};
//!
//! # async fn demo() -> Result<(), docwire::Error> {
//! let server = bind("memory", BindOptions::default()).await?;
//! let client = connect("memory", ConnectOptions::new(WireOptions::memory(&server))).await?;
//!
//! client
//!     .document()
//!     .transact(|doc| {
//!         let text = doc.get_or_insert_text("text");
//!         let mut txn = doc.transact_mut();
//!         text.push(&mut txn, "Hello");
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! Manual gating is available per client: with `auto_pull` or `auto_push`
//! disabled, received updates are applied and local updates are sent only
//! on explicit [`Client::pull`] and [`Client::push`] calls.

pub mod channel;
mod client;
#[cfg(feature = "websocket")]
pub mod config;
pub mod document;
mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod registry;
pub mod room;
mod server;
pub mod wire;

pub use channel::{Channel, ChannelError, ChannelStats};
pub use client::{Client, ConnectOptions, connect};
pub use document::Document;
pub use error::Error;
pub use event::Event;
pub use provider::{Provider, ProviderOptions};
pub use registry::WireRegistry;
pub use room::{Room, RoomFactory, RoomManager};
pub use server::{BindOptions, Server, bind};
#[cfg(feature = "file")]
pub use wire::FileOptions;
pub use wire::PipeConnection;
#[cfg(feature = "websocket")]
pub use wire::{WebSocketOptions, WebSocketServerOptions};
pub use wire::{ServerWireOptions, WireOptions};

// The document API hands out `yrs` types in transactions; re-export the
// crate so downstream users and tests don't need to pin it themselves.
pub use yrs;
