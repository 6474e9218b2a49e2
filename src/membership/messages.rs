use bincode::{Decode, Encode};

use super::record::MembershipRecord;

/// Full membership snapshot exchanged by SYNC and SYNC_ACK
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SyncData {
    pub membership: Vec<MembershipRecord>,
}
