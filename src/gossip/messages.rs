use bincode::{Decode, Encode};

use crate::transport::Message;

/// Uniquely identified payload travelling through the cluster
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Gossip {
    /// `"{member_id}-{sequence}"` of the originating member
    pub gossip_id: String,
    pub message: Message,
}

/// A batch of gossips sent to one peer in one period
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct GossipRequest {
    /// Member id of the sender
    pub from: String,
    pub gossips: Vec<Gossip>,
}
