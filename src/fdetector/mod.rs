//! SWIM failure detector
//!
//! Every `ping_time` one member is probed directly. If it does not ACK within
//! `ping_timeout`, up to `min(max_members_to_select, 5)` other members are
//! asked to probe it on our behalf (PING_REQ). No ACK within the remaining
//! budget marks the member suspected.
pub mod detector;
pub mod messages;

pub use detector::FailureDetector;
pub use messages::{FailureDetectorData, FailureDetectorEvent, MemberStatusKind};

pub const PING: &str = "gossamer/fdetector/ping";
pub const PING_REQ: &str = "gossamer/fdetector/pingReq";
pub const ACK: &str = "gossamer/fdetector/ack";
