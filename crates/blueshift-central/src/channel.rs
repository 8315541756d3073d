//! Ordered multi-consumer event fan-out.
//!
//! An [`EventChannel`] is owned by exactly one task. Every subscriber gets
//! its own unbounded queue, so a slow consumer never loses events and never
//! holds up the publisher. The last `replay` events are kept and handed to
//! late subscribers before anything new.
//!
//! ```text
//!                       ┌──────────────┐
//!                  ┌───►│ EventStream  │
//! ┌──────────────┐ │    └──────────────┘
//! │ EventChannel │─┤    ┌──────────────┐
//! │ (owner task) │ ├───►│ EventStream  │
//! └──────────────┘ │    └──────────────┘
//!         ▲        │    ┌──────────────┐
//!         │        └───►│ EventStream  │
//!  EventSubscriber      └──────────────┘
//!  (weak, clonable)
//! ```
//!
//! # Examples
//!
//! ```
//! use blueshift_central::channel::EventChannel;
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = EventChannel::new(2);
//!     channel.send(1);
//!     channel.send(2);
//!     channel.send(3);
//!
//!     let mut late = channel.subscribe();
//!     channel.send(4);
//!     drop(channel);
//!
//!     let mut seen = Vec::new();
//!     while let Some(event) = late.recv().await {
//!         seen.push(event);
//!     }
//!     assert_eq!(seen, vec![2, 3, 4]);
//! }
//! ```

use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug)]
struct Shared<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    replay: VecDeque<T>,
    capacity: usize,
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> Shared<T> {
    fn subscribe(&mut self) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in &self.replay {
            let _ = tx.send(event.clone());
        }
        self.subscribers.push(tx);
        EventStream { rx }
    }
}

/// Publishing side of an event stream.
#[derive(Debug)]
pub struct EventChannel<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T: Clone> EventChannel<T> {
    /// Create a channel that replays the last `replay` events to late
    /// subscribers. Zero disables replay.
    pub fn new(replay: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                subscribers: Vec::new(),
                replay: VecDeque::with_capacity(replay),
                capacity: replay,
            })),
        }
    }

    /// Publish an event to every live subscriber.
    ///
    /// Returns the number of subscribers it reached.
    pub fn send(&self, event: T) -> usize {
        let mut shared = lock(&self.shared);

        if shared.capacity > 0 {
            if shared.replay.len() == shared.capacity {
                shared.replay.pop_front();
            }
            shared.replay.push_back(event.clone());
        }

        shared.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        shared.subscribers.len()
    }

    /// Subscribe to events published from now on, after the replay window.
    pub fn subscribe(&self) -> EventStream<T> {
        lock(&self.shared).subscribe()
    }

    /// A clonable handle that can subscribe without keeping the channel alive.
    pub fn subscriber(&self) -> EventSubscriber<T> {
        EventSubscriber {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of subscribers still listening.
    pub fn subscriber_count(&self) -> usize {
        let mut shared = lock(&self.shared);
        shared.subscribers.retain(|tx| !tx.is_closed());
        shared.subscribers.len()
    }
}

/// Clonable subscription point for an [`EventChannel`].
#[derive(Debug)]
pub struct EventSubscriber<T> {
    shared: Weak<Mutex<Shared<T>>>,
}

impl<T> Clone for EventSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T: Clone> EventSubscriber<T> {
    /// Subscribe to the channel.
    ///
    /// If the publisher is gone, the stream is already ended.
    pub fn subscribe(&self) -> EventStream<T> {
        match self.shared.upgrade() {
            Some(shared) => lock(&shared).subscribe(),
            None => EventStream::closed(),
        }
    }

    /// Whether the publisher is still running.
    pub fn is_open(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

/// One subscriber's ordered view of a channel.
///
/// Ends once the publisher is dropped and every queued event is taken.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> EventStream<T> {
    fn closed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event_in_order() {
        let channel = EventChannel::new(0);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        for i in 0..100 {
            assert_eq!(channel.send(i), 2);
        }
        drop(channel);

        let a: Vec<_> = (&mut a).collect().await;
        let b: Vec<_> = b.collect().await;
        assert_eq!(a, (0..100).collect::<Vec<_>>());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_no_replay_when_disabled() {
        let channel = EventChannel::new(0);
        channel.send("before");

        let mut stream = channel.subscribe();
        channel.send("after");

        assert_eq!(stream.recv().await, Some("after"));
        assert_eq!(stream.try_recv(), None);
    }

    #[tokio::test]
    async fn test_replay_window() {
        let channel = EventChannel::new(3);
        for i in 0..10 {
            channel.send(i);
        }

        let mut stream = channel.subscribe();
        assert_eq!(stream.try_recv(), Some(7));
        assert_eq!(stream.try_recv(), Some(8));
        assert_eq!(stream.try_recv(), Some(9));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let channel = EventChannel::new(0);
        let stream = channel.subscribe();
        let _kept = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        drop(stream);
        assert_eq!(channel.send(()), 1);
    }

    #[tokio::test]
    async fn test_subscriber_after_publisher_dropped() {
        let channel = EventChannel::<u8>::new(4);
        let subscriber = channel.subscriber();
        assert!(subscriber.is_open());

        let mut live = subscriber.subscribe();
        channel.send(1);
        drop(channel);

        assert!(!subscriber.is_open());
        assert_eq!(live.recv().await, Some(1));
        assert_eq!(live.recv().await, None);
        assert_eq!(subscriber.subscribe().recv().await, None);
    }
}
