//! Multi-subscriber event streams
//!
//! Thin wrapper over `tokio::sync::broadcast` that adds an explicit terminal
//! signal: once `complete` is called every current subscriber drains what is
//! buffered and then sees end-of-stream, and later subscribers see
//! end-of-stream immediately.
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct EventStream<T> {
    sender: Mutex<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Publish an event to all current subscribers.
    /// Returns how many subscribers received it; zero after completion.
    pub fn publish(&self, event: T) -> usize {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        match self.sender.lock().as_ref() {
            Some(sender) => Subscription {
                receiver: sender.subscribe(),
            },
            None => Subscription::closed(),
        }
    }

    /// Idempotent
    pub fn complete(&self) {
        self.sender.lock().take();
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl<T: Clone + Send + 'static> Default for EventStream<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// A single subscriber's view of an `EventStream`. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    fn closed() -> Self {
        let (_, receiver) = broadcast::channel(1);
        Self { receiver }
    }

    /// Next event, or `None` once the stream is completed.
    /// Lagging subscribers skip what they missed and keep going.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
