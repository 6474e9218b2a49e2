//! CLI for this application
//!
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;
use crate::settings::{self, ClusterConfig};
use crate::transport::Address;

#[derive(Clone, Debug, clap::Parser)]
#[command(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("GOSSAMER_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: IpAddr,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("GOSSAMER_HTTP_LISTEN_PORT"),
        help = "Port to bind the HTTP status API to"
    )]
    pub listen_port: u16,

    // UDP listen port for the membership protocols
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_UDP,
        env("GOSSAMER_UDP_LISTEN_PORT"),
        help = "Port to bind the cluster UDP transport to"
    )]
    pub listen_port_udp: u16,

    #[clap(
        long,
        env("GOSSAMER_PUBLIC_ADDRESS"),
        help = "UDP address advertised to peers (required when listening on 0.0.0.0)"
    )]
    pub public_address: Option<SocketAddr>,

    // Cluster configuration information: seeds
    #[clap(
        long,
        env("GOSSAMER_SEEDS"),
        value_delimiter = ',',
        help = "UDP addresses of seed members (e.g., 10.0.0.1:4801,10.0.0.2:4801). If empty, starts a new cluster."
    )]
    pub seeds: Vec<Address>,

    #[clap(
        long,
        env("GOSSAMER_METADATA"),
        value_delimiter = ',',
        help = "Member metadata as key=value pairs (e.g., zone=a,role=api)"
    )]
    pub metadata: Vec<String>,

    #[clap(long, default_value = "2000", env("GOSSAMER_PING_TIME_MS"), help = "Failure detector probe period in milliseconds")]
    pub ping_time_ms: u64,

    #[clap(long, default_value = "1000", env("GOSSAMER_PING_TIMEOUT_MS"), help = "Direct probe timeout in milliseconds")]
    pub ping_timeout_ms: u64,

    #[clap(long, default_value = "3", env("GOSSAMER_PING_REQ_MEMBERS"), help = "Relays asked to probe an unresponsive member (at most 5)")]
    pub ping_req_members: usize,

    #[clap(long, default_value = "200", env("GOSSAMER_GOSSIP_INTERVAL_MS"), help = "Gossip period in milliseconds")]
    pub gossip_interval_ms: u64,

    #[clap(long, default_value = "3", env("GOSSAMER_GOSSIP_FANOUT"), help = "Peers contacted per gossip period")]
    pub gossip_fanout: usize,

    #[clap(long, default_value = "3000", env("GOSSAMER_SUSPICION_TIMEOUT_MS"), help = "Time a member stays SUSPECT before it is declared DEAD")]
    pub suspicion_timeout_ms: u64,

    #[clap(long, default_value = "30000", env("GOSSAMER_SYNC_TIME_MS"), help = "Periodic membership sync interval in milliseconds")]
    pub sync_time_ms: u64,
}

impl Cli {
    pub fn http_address(&self) -> SocketAddr {
        SocketAddr::from((self.listen_address, self.listen_port))
    }

    pub fn into_config(self) -> Result<ClusterConfig> {
        let mut config = ClusterConfig::with_seeds(self.seeds.clone());
        config.transport.listen_address = SocketAddr::from((self.listen_address, self.listen_port_udp));
        config.transport.public_address = self.public_address;
        config.membership.metadata = parse_metadata(&self.metadata)?;

        config.failure_detector.ping_time = Duration::from_millis(self.ping_time_ms);
        config.failure_detector.ping_timeout = Duration::from_millis(self.ping_timeout_ms);
        config.failure_detector.max_members_to_select = self.ping_req_members;
        config.gossip.gossip_interval = Duration::from_millis(self.gossip_interval_ms);
        config.gossip.max_members_to_select = self.gossip_fanout;
        config.membership.suspicion_timeout = Duration::from_millis(self.suspicion_timeout_ms);
        config.membership.sync_time = Duration::from_millis(self.sync_time_ms);

        config.validate()?;
        Ok(config)
    }
}

fn parse_metadata(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| pair.trim())
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(config_error!("Invalid metadata '{}', expected key=value", pair)),
        })
        .collect()
}
