//! Cluster facade
//!
//! Binds a transport, wires the failure detector and gossip into membership,
//! and exposes one join/shutdown lifecycle plus application messaging.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{GossamerError, Result};
use crate::events::{EventStream, Subscription};
use crate::fdetector::FailureDetector;
use crate::gossip::GossipProtocol;
use crate::membership::{
    MembershipEvent, MembershipProtocol, MembershipRecord, MEMBERSHIP_GOSSIP,
};
use crate::settings::ClusterConfig;
use crate::transport::{is_system_qualifier, Address, Message, Transport, UdpTransport};

/// Gossip periods to wait after `leave` so the departure can spread
const LEAVE_GOSSIP_PERIODS: u32 = 3;

pub struct Cluster {
    member_id: String,
    config: ClusterConfig,
    transport: Arc<dyn Transport>,
    failure_detector: FailureDetector,
    gossip: GossipProtocol,
    membership: MembershipProtocol,
    messages: Arc<EventStream<Message>>,
    gossips: Arc<EventStream<Message>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// Random 128-bit member id, hex encoded
pub fn generate_member_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

impl Cluster {
    /// Bind a UDP transport and join the cluster through the configured seeds
    pub async fn join(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(&config.transport).await?;
        Self::join_with_transport(config, Arc::new(transport)).await
    }

    /// Join over an already bound transport
    pub async fn join_with_transport(config: ClusterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let member_id = generate_member_id();

        let failure_detector =
            FailureDetector::new(Arc::clone(&transport), config.failure_detector.clone());
        let gossip = GossipProtocol::new(
            member_id.clone(),
            Arc::clone(&transport),
            config.gossip.clone(),
        );
        let membership = MembershipProtocol::new(
            member_id.clone(),
            Arc::clone(&transport),
            config.membership.clone(),
            failure_detector.clone(),
            gossip.clone(),
        );

        let cluster = Self {
            member_id,
            config,
            transport,
            failure_detector,
            gossip,
            membership,
            messages: Arc::new(EventStream::default()),
            gossips: Arc::new(EventStream::default()),
            forwarders: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        };
        cluster.start_forwarders();

        cluster.failure_detector.start();
        cluster.gossip.start();
        if let Err(e) = cluster.membership.start().await {
            cluster.stop_components().await;
            return Err(e);
        }

        info!(
            "[{}] Joined cluster at {} with {} members",
            cluster.member_id,
            cluster.address(),
            cluster.members().len()
        );
        Ok(cluster)
    }

    fn start_forwarders(&self) {
        let mut inbound = self.transport.listen_all();
        let messages = Arc::clone(&self.messages);
        let application_messages = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if !is_system_qualifier(&message.qualifier) {
                    messages.publish(message);
                }
            }
            messages.complete();
        });

        let mut received = self.gossip.listen();
        let gossips = Arc::clone(&self.gossips);
        let application_gossips = tokio::spawn(async move {
            while let Some(message) = received.recv().await {
                if message.qualifier != MEMBERSHIP_GOSSIP {
                    gossips.publish(message);
                }
            }
            gossips.complete();
        });

        let mut forwarders = self.forwarders.lock();
        forwarders.push(application_messages);
        forwarders.push(application_gossips);
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn address(&self) -> Address {
        self.transport.local_address()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Best-effort send to any address
    pub async fn send(&self, address: Address, message: Message) -> Result<()> {
        self.transport.send(address, message).await
    }

    pub async fn send_to_member(&self, member_id: &str, message: Message) -> Result<()> {
        let member = self
            .member(member_id)
            .ok_or_else(|| GossamerError::NotFound(format!("member {}", member_id)))?;
        self.send(member.address, message).await
    }

    /// Application messages; protocol traffic is filtered out
    pub fn listen(&self) -> Subscription<Message> {
        self.messages.subscribe()
    }

    /// Disseminate a message to every member; returns the gossip id
    pub fn spread_gossip(&self, message: Message) -> Result<String> {
        if is_system_qualifier(&message.qualifier) {
            return Err(GossamerError::Config(format!(
                "qualifier {} is reserved",
                message.qualifier
            )));
        }
        Ok(self.gossip.spread(message))
    }

    /// Application gossips received from peers; membership gossip is filtered out
    pub fn listen_gossips(&self) -> Subscription<Message> {
        self.gossips.subscribe()
    }

    pub fn members(&self) -> Vec<MembershipRecord> {
        self.membership.members()
    }

    pub fn other_members(&self) -> Vec<MembershipRecord> {
        self.membership.other_members()
    }

    pub fn local_member(&self) -> MembershipRecord {
        self.membership.local_member()
    }

    pub fn member(&self, id: &str) -> Option<MembershipRecord> {
        self.membership.member(id)
    }

    pub fn member_by_address(&self, address: &Address) -> Option<MembershipRecord> {
        self.membership.member_by_address(address)
    }

    pub fn listen_membership(&self) -> Subscription<MembershipEvent> {
        self.membership.listen()
    }

    /// Local detector's suspected addresses
    pub fn suspected_members(&self) -> Vec<Address> {
        self.failure_detector.suspected_members()
    }

    /// Leave gracefully: gossip the departure for a few periods, then stop
    /// every component and the transport. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("[{}] Shutting down", self.member_id);
        if let Err(e) = self.membership.leave() {
            warn!("[{}] Failed to announce leave: {}", self.member_id, e);
        }
        tokio::time::sleep(self.config.gossip.gossip_interval * LEAVE_GOSSIP_PERIODS).await;
        self.stop_components().await;
        info!("[{}] Shutdown complete", self.member_id);
        Ok(())
    }

    async fn stop_components(&self) {
        self.membership.stop();
        self.gossip.stop();
        self.failure_detector.stop();
        self.transport.stop().await;
        for handle in self.forwarders.lock().drain(..) {
            handle.abort();
        }
        self.messages.complete();
        self.gossips.complete();
    }
}
