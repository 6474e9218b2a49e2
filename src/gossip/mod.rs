//! Epidemic dissemination
//!
//! Each period a few random peers receive the envelopes they do not have yet.
//! Envelopes are forwarded for `gossip_periods_to_spread` periods; their ids
//! are remembered for `gossip_seen_history_periods` so late duplicates are
//! dropped instead of delivered twice.
pub mod messages;
pub mod protocol;

pub use messages::{Gossip, GossipRequest};
pub use protocol::GossipProtocol;

pub const GOSSIP_REQ: &str = "gossamer/gossip/req";
