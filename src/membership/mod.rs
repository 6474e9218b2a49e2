//! Membership Module
//!
//! The authoritative view of the cluster. Detector signals and gossiped or
//! synced records are reconciled into one record per member, ordered by
//! incarnation and then by status (DEAD > SUSPECT > ALIVE).
pub mod messages;
pub mod protocol;
pub mod record;

pub use messages::SyncData;
pub use protocol::MembershipProtocol;
pub use record::{MemberStatus, MembershipEvent, MembershipRecord};

pub const SYNC: &str = "gossamer/membership/sync";
pub const SYNC_ACK: &str = "gossamer/membership/syncAck";
pub const MEMBERSHIP_GOSSIP: &str = "gossamer/membership/gossip";
