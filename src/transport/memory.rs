//! In-process network
//!
//! Every `MemoryTransport` bound on a `MemoryNetwork` can reach every other one
//! by address. Faults are injected on the network: a blocked (from, to) link
//! drops messages in that direction, and a killed endpoint neither sends nor
//! receives. Delivery is synchronous, so ordering between one pair is preserved.
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use super::{Address, Message, MessageRouter, Transport};
use crate::error::Result;
use crate::transport_error;
use crate::events::Subscription;

const FIRST_PORT: u16 = 20_000;

#[derive(Debug, Default)]
struct NetworkInner {
    endpoints: DashMap<Address, Arc<MessageRouter>>,
    blocked: RwLock<HashSet<(Address, Address)>>,
    next_port: AtomicU16,
    sent: DashMap<String, u64>,
    dropped: AtomicU64,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a transport on the next free loopback address
    pub fn bind(&self) -> Result<MemoryTransport> {
        loop {
            let offset = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
            let port = FIRST_PORT.checked_add(offset).ok_or_else(|| {
                transport_error!("Memory network ran out of ports")
            })?;
            let address = Address::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
            if !self.inner.endpoints.contains_key(&address) {
                return self.bind_to(address);
            }
        }
    }

    pub fn bind_to(&self, address: Address) -> Result<MemoryTransport> {
        let router = Arc::new(MessageRouter::new());
        match self.inner.endpoints.entry(address) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(transport_error!("Address {} already in use", address))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&router));
                Ok(MemoryTransport {
                    network: self.clone(),
                    local_address: address,
                    router,
                })
            }
        }
    }

    /// Drop every message sent from `from` to `to`
    pub fn block(&self, from: Address, to: Address) {
        self.inner.blocked.write().insert((from, to));
    }

    pub fn unblock(&self, from: Address, to: Address) {
        self.inner.blocked.write().remove(&(from, to));
    }

    /// Block both directions between two endpoints
    pub fn partition(&self, a: Address, b: Address) {
        let mut blocked = self.inner.blocked.write();
        blocked.insert((a, b));
        blocked.insert((b, a));
    }

    pub fn heal(&self) {
        self.inner.blocked.write().clear();
    }

    /// Take an endpoint off the network as if its process died
    pub fn kill(&self, address: Address) {
        if let Some((_, router)) = self.inner.endpoints.remove(&address) {
            router.close();
        }
    }

    pub fn is_alive(&self, address: &Address) -> bool {
        self.inner.endpoints.contains_key(address)
    }

    /// Messages with this qualifier accepted for delivery so far
    pub fn sent_count(&self, qualifier: &str) -> u64 {
        self.inner.sent.get(qualifier).map(|c| *c).unwrap_or(0)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, from: Address, to: Address, message: Message) {
        if !self.is_alive(&from) || self.inner.blocked.read().contains(&(from, to)) {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let router = match self.inner.endpoints.get(&to) {
            Some(router) => Arc::clone(router.value()),
            None => {
                trace!("No endpoint at {}, dropping {}", to, message.qualifier);
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        *self.inner.sent.entry(message.qualifier.clone()).or_insert(0) += 1;
        router.dispatch(message);
    }
}

pub struct MemoryTransport {
    network: MemoryNetwork,
    local_address: Address,
    router: Arc<MessageRouter>,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> Address {
        self.local_address
    }

    async fn send(&self, address: Address, mut message: Message) -> Result<()> {
        if self.router.is_closed() {
            return Err(transport_error!("Transport is stopped"));
        }
        message.sender = Some(self.local_address);
        self.network.deliver(self.local_address, address, message);
        Ok(())
    }

    fn listen(&self, qualifier: &str) -> Subscription<Message> {
        self.router.subscribe(qualifier)
    }

    fn listen_all(&self) -> Subscription<Message> {
        self.router.subscribe_all()
    }

    async fn stop(&self) {
        self.network.kill(self.local_address);
        self.router.close();
    }
}
