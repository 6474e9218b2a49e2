//! Gossamer cluster settings
//!
//! Plain configuration structs with defaults. Every component receives its own
//! section; `ClusterConfig::validate` is the single place invalid combinations
//! are rejected.
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config_error;
use crate::error::Result;
use crate::transport::Address;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 4800;
pub const DEFAULT_PORT_HTTP: &str = "4800";
pub const STANDARD_PORT_UDP: u16 = 4801;
pub const DEFAULT_PORT_UDP: &str = "4801";

/// Indirect probing never fans out to more relays than this.
pub const MAX_PING_REQ_MEMBERS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureDetectorConfig {
    /// Length of one probe period; a new probe starts every `ping_time`
    pub ping_time: Duration,
    /// How long to wait for a direct ACK before escalating to PING_REQ
    pub ping_timeout: Duration,
    /// Relays asked to probe on our behalf (capped at `MAX_PING_REQ_MEMBERS`)
    pub max_members_to_select: usize,
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        Self {
            ping_time: Duration::from_millis(2000),
            ping_timeout: Duration::from_millis(1000),
            max_members_to_select: 3,
        }
    }
}

impl FailureDetectorConfig {
    /// Budget left for indirect probing once the direct ping timed out.
    /// `None` when `ping_timeout >= ping_time`.
    pub fn ping_req_timeout(&self) -> Option<Duration> {
        self.ping_time
            .checked_sub(self.ping_timeout)
            .filter(|remaining| !remaining.is_zero())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipConfig {
    pub gossip_interval: Duration,
    /// Envelopes sent to a single peer per period
    pub max_gossip_sent: usize,
    /// Peers contacted per period
    pub max_members_to_select: usize,
    /// Periods an envelope stays in the forward queue
    pub gossip_periods_to_spread: u64,
    /// Periods a gossip id is remembered for duplicate suppression
    pub gossip_seen_history_periods: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(200),
            max_gossip_sent: 3,
            max_members_to_select: 3,
            gossip_periods_to_spread: 10,
            gossip_seen_history_periods: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipConfig {
    pub seed_members: Vec<Address>,
    pub metadata: BTreeMap<String, String>,
    /// Interval of the periodic anti-entropy sync
    pub sync_time: Duration,
    /// How long a sync waits for its SYNC_ACK
    pub sync_timeout: Duration,
    /// How long a member stays SUSPECT before it is declared DEAD
    pub suspicion_timeout: Duration,
    /// How long a DEAD record is retained to reject stale claims
    pub dead_member_cleanup: Duration,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            seed_members: Vec::new(),
            metadata: BTreeMap::new(),
            sync_time: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(3),
            suspicion_timeout: Duration::from_secs(3),
            dead_member_cleanup: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Socket the UDP transport binds to
    pub listen_address: SocketAddr,
    /// Address advertised to peers. Required when `listen_address` is unspecified (0.0.0.0).
    pub public_address: Option<SocketAddr>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], STANDARD_PORT_UDP)),
            public_address: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    pub transport: TransportConfig,
    pub failure_detector: FailureDetectorConfig,
    pub gossip: GossipConfig,
    pub membership: MembershipConfig,
}

impl ClusterConfig {
    /// Config joining the given seeds, defaults everywhere else
    pub fn with_seeds(seed_members: Vec<Address>) -> Self {
        let mut config = Self::default();
        config.membership.seed_members = seed_members;
        config
    }

    pub fn validate(&self) -> Result<()> {
        let transport = &self.transport;
        if transport.listen_address.ip().is_unspecified() && transport.public_address.is_none() {
            return Err(config_error!(
                "transport.public_address is required when listening on {}",
                transport.listen_address
            ));
        }

        let fd = &self.failure_detector;
        if fd.ping_time.is_zero() {
            return Err(config_error!("failure_detector.ping_time must be > 0"));
        }
        if fd.ping_timeout.is_zero() {
            return Err(config_error!("failure_detector.ping_timeout must be > 0"));
        }
        if fd.max_members_to_select == 0 {
            return Err(config_error!(
                "failure_detector.max_members_to_select must be > 0"
            ));
        }

        let gossip = &self.gossip;
        if gossip.gossip_interval.is_zero() {
            return Err(config_error!("gossip.gossip_interval must be > 0"));
        }
        if gossip.max_gossip_sent == 0 || gossip.max_members_to_select == 0 {
            return Err(config_error!(
                "gossip.max_gossip_sent and gossip.max_members_to_select must be > 0"
            ));
        }
        if gossip.gossip_seen_history_periods < gossip.gossip_periods_to_spread {
            return Err(config_error!(
                "gossip.gossip_seen_history_periods ({}) must be >= gossip_periods_to_spread ({})",
                gossip.gossip_seen_history_periods,
                gossip.gossip_periods_to_spread
            ));
        }

        let membership = &self.membership;
        if membership.sync_time.is_zero() || membership.sync_timeout.is_zero() {
            return Err(config_error!(
                "membership.sync_time and membership.sync_timeout must be > 0"
            ));
        }
        if membership.suspicion_timeout.is_zero() || membership.dead_member_cleanup.is_zero() {
            return Err(config_error!(
                "membership.suspicion_timeout and membership.dead_member_cleanup must be > 0"
            ));
        }
        Ok(())
    }
}
