//! Qualifier-keyed dispatch of inbound messages
//!
//! Each qualifier gets its own stream, so a subscriber only ever sees the
//! messages it asked for instead of filtering the whole inbound flow.
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::trace;

use super::Message;
use crate::events::{EventStream, Subscription};

#[derive(Debug, Default)]
pub struct MessageRouter {
    routes: DashMap<String, EventStream<Message>>,
    all: EventStream<Message>,
    closed: AtomicBool,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, qualifier: &str) -> Subscription<Message> {
        let subscription = self
            .routes
            .entry(qualifier.to_string())
            .or_default()
            .subscribe();
        // a route created while closing must not outlive the close
        if self.closed.load(Ordering::Acquire) {
            if let Some(route) = self.routes.get(qualifier) {
                route.complete();
            }
        }
        subscription
    }

    pub fn subscribe_all(&self) -> Subscription<Message> {
        self.all.subscribe()
    }

    /// Hand an inbound message to its qualifier's subscribers and to catch-all subscribers
    pub fn dispatch(&self, message: Message) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let delivered = self
            .routes
            .get(&message.qualifier)
            .map(|route| route.publish(message.clone()))
            .unwrap_or(0);
        if delivered == 0 {
            trace!("No subscriber for qualifier {}", message.qualifier);
        }
        self.all.publish(message);
    }

    /// Complete every stream. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for route in self.routes.iter() {
            route.complete();
        }
        self.all.complete();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_dispatch_by_qualifier() {
        let router = MessageRouter::new();
        let mut pings = router.subscribe("gossamer/fdetector/ping");
        let mut acks = router.subscribe("gossamer/fdetector/ack");
        let mut all = router.subscribe_all();

        router.dispatch(Message::new("gossamer/fdetector/ping"));

        assert_eq!(
            pings.recv().await.unwrap().qualifier,
            "gossamer/fdetector/ping"
        );
        assert!(acks.try_recv().is_none());
        assert_eq!(all.recv().await.unwrap().qualifier, "gossamer/fdetector/ping");
    }

    #[tokio::test]
    async fn test_close_completes_subscriptions() {
        let router = MessageRouter::new();
        let mut pings = router.subscribe("gossamer/fdetector/ping");
        router.close();
        router.close();

        let end = timeout(Duration::from_millis(100), pings.recv()).await.unwrap();
        assert!(end.is_none());

        let mut late = router.subscribe("gossamer/gossip/req");
        let end = timeout(Duration::from_millis(100), late.recv()).await.unwrap();
        assert!(end.is_none());

        router.dispatch(Message::new("gossamer/fdetector/ping"));
        assert!(router.is_closed());
    }
}
