//! Thread-safe funnel for driver callbacks.
//!
//! Native stacks invoke callbacks on their own threads, with no ordering or
//! backpressure guarantees relative to the consumer. A [`CallbackSink`] turns
//! each callback into a message on an unbounded, ordered channel owned by a
//! single task. That task is the only place the callback is acted on.

use tokio::sync::mpsc;

/// Sending half handed to a driver.
///
/// Cloning is cheap; delivery never blocks and never requires a runtime, so
/// it is safe to call from any OS thread.
#[derive(Debug)]
pub struct CallbackSink<C> {
    tx: mpsc::UnboundedSender<C>,
}

impl<C> Clone for CallbackSink<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> CallbackSink<C> {
    /// Wrap the sending half of an existing channel.
    pub fn new(tx: mpsc::UnboundedSender<C>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver its callbacks arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<C>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver one callback.
    ///
    /// Returns `false` if the owning task has gone away; the callback is
    /// dropped in that case.
    pub fn deliver(&self, callback: C) -> bool {
        self.tx.send(callback).is_ok()
    }

    /// Whether the owning task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
