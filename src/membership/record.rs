use std::collections::BTreeMap;
use std::fmt;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::transport::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberStatus {
    Alive,
    Suspect,
    Dead,
}

impl MemberStatus {
    /// Precedence between claims at the same incarnation
    pub fn rank(self) -> u8 {
        match self {
            MemberStatus::Alive => 0,
            MemberStatus::Suspect => 1,
            MemberStatus::Dead => 2,
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            MemberStatus::Alive => "ALIVE",
            MemberStatus::Suspect => "SUSPECT",
            MemberStatus::Dead => "DEAD",
        };
        f.pad(status)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct MembershipRecord {
    pub id: String,
    pub address: Address,
    pub metadata: BTreeMap<String, String>,
    pub status: MemberStatus,
    pub incarnation: u64,
}

impl MembershipRecord {
    /// A freshly started member: ALIVE at incarnation 0
    pub fn new(id: impl Into<String>, address: Address, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            address,
            metadata,
            status: MemberStatus::Alive,
            incarnation: 0,
        }
    }

    /// Same member and incarnation, different status
    pub fn with_status(&self, status: MemberStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }

    pub fn is_suspect(&self) -> bool {
        self.status == MemberStatus::Suspect
    }

    pub fn is_dead(&self) -> bool {
        self.status == MemberStatus::Dead
    }

    /// Whether this claim replaces `current`: a higher incarnation always wins,
    /// an equal one wins only with a stronger status (DEAD > SUSPECT > ALIVE).
    pub fn overrides(&self, current: &MembershipRecord) -> bool {
        self.incarnation > current.incarnation
            || (self.incarnation == current.incarnation
                && self.status.rank() > current.status.rank())
    }
}

impl fmt::Display for MembershipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {} #{}",
            self.id, self.address, self.status, self.incarnation
        )
    }
}

/// Change to the local membership view
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipEvent {
    Added(MembershipRecord),
    Updated {
        old: MembershipRecord,
        new: MembershipRecord,
    },
    Removed(MembershipRecord),
}

impl MembershipEvent {
    pub fn record(&self) -> &MembershipRecord {
        match self {
            MembershipEvent::Added(record) | MembershipEvent::Removed(record) => record,
            MembershipEvent::Updated { new, .. } => new,
        }
    }
}
