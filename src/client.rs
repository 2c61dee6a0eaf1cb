// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client construction: the `connect` entry point and the client handle.

use std::sync::Arc;

use tokio_util::task::AbortOnDropHandle;
use tracing::debug;

use crate::channel::{Channel, ChannelError};
use crate::document::Document;
use crate::error::Error;
use crate::event::Event;
use crate::provider::{Provider, ProviderOptions};
use crate::registry::WireRegistry;
use crate::wire::WireOptions;

/// Options accepted by [`connect`].
#[derive(Debug)]
pub struct ConnectOptions {
    pub(crate) id: String,
    pub(crate) document: Option<Document>,
    pub(crate) auto_push: bool,
    pub(crate) auto_pull: bool,
    pub(crate) wire: WireOptions,
}

impl ConnectOptions {
    /// Returns options for the given wire, with an empty room id, a new
    /// document, and automatic push and pull.
    pub fn new(wire: impl Into<WireOptions>) -> Self {
        Self {
            id: String::new(),
            document: None,
            auto_push: true,
            auto_pull: true,
            wire: wire.into(),
        }
    }

    /// Sets the id of the room to join on the server.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Synchronizes an externally supplied document instead of a new one.
    pub fn document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    /// When false, locally committed updates are only sent out on
    /// [`Client::push`].
    pub fn auto_push(mut self, auto_push: bool) -> Self {
        self.auto_push = auto_push;
        self
    }

    /// When false, received updates are only applied on [`Client::pull`],
    /// and `connect` does not wait for the handshake.
    pub fn auto_pull(mut self, auto_pull: bool) -> Self {
        self.auto_pull = auto_pull;
        self
    }
}

/// Connects to a server over the named wire.
///
/// With automatic pull (the default) this returns once the handshake has
/// completed, so the returned client is synchronized; with `auto_pull`
/// disabled it returns immediately and the handshake waits for the first
/// [`Client::pull`]. Dropping the client ends the session.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), docwire::Error> {
/// use docwire::{BindOptions, ConnectOptions, WireOptions, bind, connect};
///
/// let server = bind("memory", BindOptions::default()).await?;
/// let client = connect("memory", ConnectOptions::new(WireOptions::memory(&server))).await?;
/// client.synchronized().wait().await;
/// # Ok(())
/// # }
/// ```
pub async fn connect(wire: &str, options: ConnectOptions) -> Result<Client, Error> {
    let factory = WireRegistry::global().client(wire)?;
    factory(options).await
}

/// A connected client session.
///
/// Holds the synchronized document, the channel to the server, and the
/// provider driving the protocol between them. Dropping the handle
/// cancels the protocol task and its update emitter.
pub struct Client {
    document: Document,
    channel: Arc<dyn Channel>,
    provider: Arc<Provider>,
    _task: AbortOnDropHandle<Result<(), Error>>,
}

impl Client {
    /// Spawns a provider over `channel` and waits for the handshake
    /// according to the gating mode. Used by wire client factories.
    pub(crate) async fn start(
        document: Document,
        channel: Arc<dyn Channel>,
        auto_push: bool,
        auto_pull: bool,
    ) -> Result<Client, Error> {
        let provider = Provider::new(
            document.clone(),
            channel.clone(),
            ProviderOptions {
                auto_push,
                auto_pull,
            },
        );
        let mut task = tokio::spawn({
            let provider = provider.clone();
            async move {
                let result = provider.run().await;
                if let Err(err) = &result {
                    debug!(%err, "provider ended with an error");
                }
                result
            }
        });

        if auto_pull {
            tokio::select! {
                _ = provider.synchronized().wait() => {}
                result = &mut task => {
                    // The protocol ended before the handshake completed:
                    // surface what happened as a fatal connect error.
                    return Err(match result {
                        Ok(Ok(())) => ChannelError::Closed.into(),
                        Ok(Err(err)) => err,
                        Err(err) => ChannelError::Transport(err.to_string()).into(),
                    });
                }
            }
        }

        Ok(Client {
            document,
            channel,
            provider,
            _task: AbortOnDropHandle::new(task),
        })
    }

    /// The synchronized shared document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The channel this client communicates over.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Event set once the handshake has completed.
    pub fn synchronized(&self) -> &Event {
        self.provider.synchronized()
    }

    /// Applies received updates once, for clients created with
    /// `auto_pull` disabled.
    pub fn pull(&self) {
        self.provider.pull();
    }

    /// Sends locally committed updates once, for clients created with
    /// `auto_push` disabled.
    pub fn push(&self) {
        self.provider.push();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("synchronized", &self.synchronized().is_set())
            .finish_non_exhaustive()
    }
}
