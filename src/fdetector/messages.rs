//! Failure detector wire payloads and status events
use bincode::{Decode, Encode};

use crate::transport::Address;

/// Payload of PING, PING_REQ and ACK
///
/// `original_issuer` is only set on the relay leg of an indirect probe: a
/// relay pings the target on behalf of the issuer, and the target's ACK comes
/// back to the relay carrying the issuer so it can be forwarded.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct FailureDetectorData {
    pub from: Address,
    pub to: Address,
    pub original_issuer: Option<Address>,
}

impl FailureDetectorData {
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            original_issuer: None,
        }
    }

    pub fn relayed(from: Address, to: Address, original_issuer: Address) -> Self {
        Self {
            from,
            to,
            original_issuer: Some(original_issuer),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberStatusKind {
    Suspected,
    Trusted,
}

/// Emitted only when a member actually enters or leaves the suspected set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureDetectorEvent {
    pub kind: MemberStatusKind,
    pub member: Address,
}

impl FailureDetectorEvent {
    pub fn suspected(member: Address) -> Self {
        Self {
            kind: MemberStatusKind::Suspected,
            member,
        }
    }

    pub fn trusted(member: Address) -> Self {
        Self {
            kind: MemberStatusKind::Trusted,
            member,
        }
    }

    pub fn is_suspected(&self) -> bool {
        self.kind == MemberStatusKind::Suspected
    }
}
