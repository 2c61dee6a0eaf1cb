// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-shot synchronization primitives used by providers.

use tokio::sync::{Mutex, mpsc, watch};

/// A set-once event that can be queried and awaited.
///
/// Used for the `synchronized` signal: set exactly once per provider
/// lifetime, observable by any number of tasks.
#[derive(Debug)]
pub struct Event {
    state: watch::Sender<bool>,
}

impl Event {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    /// Sets the event. Further calls have no effect.
    pub(crate) fn set(&self) {
        self.state.send_replace(true);
    }

    /// Returns whether the event has been set.
    pub fn is_set(&self) -> bool {
        *self.state.borrow()
    }

    /// Waits until the event is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut state = self.state.subscribe();
        // Cannot fail: the sender lives at least as long as `self`.
        let _ = state.wait_for(|set| *set).await;
    }
}

/// A single-shot gate.
///
/// Each release authorizes exactly one pass and the gate re-arms itself
/// when the pass is taken. Releasing an already released gate is a no-op,
/// mirroring an event that is still set. Modeled as a one-slot channel.
#[derive(Debug)]
pub(crate) struct Gate {
    permits: mpsc::Sender<()>,
    slot: Mutex<mpsc::Receiver<()>>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        let (permits, slot) = mpsc::channel(1);
        Self {
            permits,
            slot: Mutex::new(slot),
        }
    }

    /// Authorizes one pass.
    pub(crate) fn release(&self) {
        let _ = self.permits.try_send(());
    }

    /// Waits for an authorization and consumes it.
    pub(crate) async fn pass(&self) {
        let _ = self.slot.lock().await.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn event_is_set_once() {
        let event = Event::new();
        assert!(!event.is_set());
        event.set();
        event.set();
        assert!(event.is_set());
        event.wait().await;
    }

    #[tokio::test]
    async fn gate_authorizes_one_pass_per_release() {
        let gate = Gate::new();
        gate.release();
        // A second release while the permit is unconsumed collapses.
        gate.release();
        gate.pass().await;

        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.pass());
        assert!(blocked.await.is_err());
    }

    #[tokio::test]
    async fn gate_rearms_after_pass() {
        let gate = Gate::new();
        gate.release();
        gate.pass().await;
        gate.release();
        gate.pass().await;
    }
}
