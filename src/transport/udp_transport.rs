//! UDP Transport
//!
//! One bound socket per node. A background task receives datagrams, decodes
//! each into a `Message` and dispatches it by qualifier. Sends go straight to
//! the socket; delivery is best-effort.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Address, Message, MessageRouter, Transport};
use crate::error::Result;
use crate::transport_error;
use crate::events::Subscription;
use crate::settings::TransportConfig;

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Statistics for the transport
#[derive(Debug, Default)]
pub struct TransportStats {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub send_errors: AtomicU64,
    pub receive_errors: AtomicU64,
}

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_address: Address,
    router: Arc<MessageRouter>,
    stats: Arc<TransportStats>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind the socket and start receiving
    pub async fn bind(config: &TransportConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.listen_address).await.map_err(|e| {
            transport_error!("Socket bind to {} failed: {}", config.listen_address, e)
        })?;
        let bound = socket
            .local_addr()
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        let local_address = config.public_address.unwrap_or(bound);

        let transport = Self {
            socket: Arc::new(socket),
            local_address,
            router: Arc::new(MessageRouter::new()),
            stats: Arc::new(TransportStats::default()),
            receiver: Mutex::new(None),
        };
        transport.start_receiving();
        info!("UDP transport bound to {} (advertised as {})", bound, local_address);
        Ok(transport)
    }

    fn start_receiving(&self) {
        let socket = Arc::clone(&self.socket);
        let router = Arc::clone(&self.router);
        let stats = Arc::clone(&self.stats);

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 65536]; // 64KB buffer

            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, addr)) => match Message::decode(&buf[..len]) {
                        Ok(message) => {
                            stats.messages_received.fetch_add(1, Ordering::Relaxed);
                            router.dispatch(message);
                        }
                        Err(e) => {
                            stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                            debug!("Dropping undecodable datagram from {}: {}", addr, e);
                        }
                    },
                    Err(e) => {
                        // ICMP port-unreachable from a dead peer surfaces here on some platforms
                        stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                        debug!("UDP receive error: {}", e);
                    }
                }
            }
        });
        *self.receiver.lock() = Some(handle);
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Address the socket is actually bound to
    pub fn bound_address(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_address(&self) -> Address {
        self.local_address
    }

    async fn send(&self, address: Address, mut message: Message) -> Result<()> {
        if self.router.is_closed() {
            return Err(transport_error!("Transport is stopped"));
        }
        message.sender = Some(self.local_address);
        let bytes = message.encode()?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(transport_error!(
                "Message {} is {} bytes, exceeds datagram limit of {}",
                message.qualifier,
                bytes.len(),
                MAX_DATAGRAM_SIZE
            ));
        }

        match self.socket.send_to(&bytes, address).await {
            Ok(_) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(transport_error!("Send to {} failed: {}", address, e))
            }
        }
    }

    fn listen(&self, qualifier: &str) -> Subscription<Message> {
        self.router.subscribe(qualifier)
    }

    fn listen_all(&self) -> Subscription<Message> {
        self.router.subscribe_all()
    }

    async fn stop(&self) {
        if let Some(handle) = self.receiver.lock().take() {
            handle.abort();
        }
        self.router.close();
        let stats = &self.stats;
        info!(
            "UDP transport {} stopped: sent={} received={} send_errors={} receive_errors={}",
            self.local_address,
            stats.messages_sent.load(Ordering::Relaxed),
            stats.messages_received.load(Ordering::Relaxed),
            stats.send_errors.load(Ordering::Relaxed),
            stats.receive_errors.load(Ordering::Relaxed),
        );
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.receiver.lock().take() {
            handle.abort();
        }
    }
}
