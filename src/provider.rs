// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sync protocol engine.
//!
//! A [`Provider`] couples a [`Document`] to a [`Channel`] and drives the
//! two-step handshake followed by steady-state update exchange:
//!
//! 1. Send a step 1 message summarizing the local document.
//! 2. For every inbound sync message, hand the payload to the document and
//!    send the reply, if one is produced.
//! 3. Once a step 2 message has been received the provider is
//!    synchronized: the update emitter starts forwarding locally committed
//!    updates to the channel.
//!
//! With `auto_pull` or `auto_push` disabled the respective side is gated:
//! every [`Provider::pull`] or [`Provider::push`] call authorizes exactly
//! one pass. Pull gating engages per inbound message only after the
//! handshake; bypassing it while handshaking keeps a gated client from
//! deadlocking its own step 2.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelError};
use crate::document::Document;
use crate::error::Error;
use crate::event::{Event, Gate};
use crate::message::SyncMessage;

/// Gating configuration for a provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderOptions {
    /// When false, update emission waits on [`Provider::push`].
    pub auto_push: bool,
    /// When false, applying inbound messages waits on [`Provider::pull`].
    pub auto_pull: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            auto_push: true,
            auto_pull: true,
        }
    }
}

/// A client session driving the sync protocol over a channel.
pub struct Provider {
    document: Document,
    channel: Arc<dyn Channel>,
    auto_push: bool,
    auto_pull: bool,
    pull_gate: Gate,
    push_gate: Gate,
    synchronizing: AtomicBool,
    synchronized: Event,
}

impl Provider {
    pub fn new(document: Document, channel: Arc<dyn Channel>, options: ProviderOptions) -> Arc<Self> {
        Arc::new(Self {
            document,
            channel,
            auto_push: options.auto_push,
            auto_pull: options.auto_pull,
            pull_gate: Gate::new(),
            push_gate: Gate::new(),
            synchronizing: AtomicBool::new(false),
            synchronized: Event::new(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Event set once the handshake has completed.
    pub fn synchronized(&self) -> &Event {
        &self.synchronized
    }

    /// Authorizes applying received messages once, when created with
    /// `auto_pull` disabled.
    pub fn pull(&self) {
        self.pull_gate.release();
    }

    /// Authorizes draining locally buffered updates once, when created
    /// with `auto_push` disabled.
    pub fn push(&self) {
        self.push_gate.release();
    }

    async fn wait_pull(&self) {
        if self.auto_pull {
            return;
        }
        if !self.synchronizing.load(Ordering::Acquire) {
            self.pull_gate.pass().await;
        }
    }

    async fn wait_push(&self) {
        if !self.auto_push {
            self.push_gate.pass().await;
        }
    }

    /// Runs the protocol until the channel closes.
    ///
    /// Channel errors before the handshake completes are fatal and
    /// returned; afterwards they are logged and end the session, since the
    /// caller's scope already delimits it and reconnecting is the recovery
    /// primitive.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        self.wait_pull().await;
        self.synchronizing.store(true, Ordering::Release);

        let step1 = self.document.sync_step1().await;
        self.channel.send(step1.encode()).await?;

        let mut emitter: Option<AbortOnDropHandle<()>> = None;
        loop {
            let data = match self.channel.recv().await {
                Ok(data) => data,
                Err(ChannelError::Closed) => break,
                Err(err) => {
                    if !self.synchronized.is_set() {
                        return Err(err.into());
                    }
                    debug!(%err, "channel failed after synchronization");
                    break;
                }
            };
            let message = match SyncMessage::decode(&data) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "dropping unrecognized message");
                    continue;
                }
            };

            self.wait_pull().await;
            let step2 = matches!(message, SyncMessage::Step2(_));
            let reply = match self.document.handle_sync_message(message).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(%err, "dropping sync message");
                    continue;
                }
            };
            if let Some(reply) = reply {
                if let Err(err) = self.channel.send(reply.encode()).await {
                    if !self.synchronized.is_set() {
                        return Err(err.into());
                    }
                    debug!(%err, "channel failed after synchronization");
                    break;
                }
            }

            if step2 && !self.synchronized.is_set() {
                // Subscribe before signalling so no update committed after
                // the handshake can slip past the emitter.
                let events = self.document.subscribe();
                self.synchronized.set();
                self.synchronizing.store(false, Ordering::Release);
                emitter = Some(AbortOnDropHandle::new(tokio::spawn(
                    self.clone().send_updates(events),
                )));
            }
        }

        drop(emitter);
        Ok(())
    }

    /// Forwards committed document updates to the channel.
    ///
    /// When push-gated, one release drains the updates already buffered at
    /// release time: the buffer depth is snapshotted after the gate opens
    /// and counted down before the gate is awaited again.
    async fn send_updates(self: Arc<Self>, mut events: broadcast::Receiver<Vec<u8>>) {
        let mut remaining = 0usize;
        loop {
            let update = match events.recv().await {
                Ok(update) => update,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "update stream lagged, skipping missed updates");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if remaining == 0 {
                self.wait_push().await;
                remaining = events.len();
            } else {
                remaining -= 1;
            }
            let message = SyncMessage::Update(update).encode();
            if let Err(err) = self.channel.send(message).await {
                debug!(%err, "stopping update emitter");
                break;
            }
        }
    }
}
