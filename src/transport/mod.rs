//! Transport Module
//!
//! The protocols only need three things from the network: the local address,
//! fire-and-forget `send`, and a way to subscribe to inbound messages by
//! qualifier. `UdpTransport` carries one encoded `Message` per datagram;
//! `MemoryNetwork` wires transports together in-process for tests.

pub mod memory;
pub mod message;
pub mod router;
pub mod udp_transport;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::Subscription;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use message::Message;
pub use router::MessageRouter;
pub use udp_transport::{TransportStats, UdpTransport};

/// Network endpoint of a cluster member (host:port)
pub type Address = SocketAddr;

/// Every qualifier the membership layer itself uses lives under this prefix
pub const SYSTEM_QUALIFIER_PREFIX: &str = "gossamer/";

pub fn is_system_qualifier(qualifier: &str) -> bool {
    qualifier.starts_with(SYSTEM_QUALIFIER_PREFIX)
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address peers use to reach this transport
    fn local_address(&self) -> Address;

    /// Best-effort, unacknowledged send. The transport stamps `sender`.
    async fn send(&self, address: Address, message: Message) -> Result<()>;

    /// Inbound messages carrying exactly this qualifier
    fn listen(&self, qualifier: &str) -> Subscription<Message>;

    /// Every inbound message
    fn listen_all(&self) -> Subscription<Message>;

    /// Stop receiving; completes every subscription
    async fn stop(&self);
}
