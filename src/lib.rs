//! gossamer: self-organizing cluster membership
//!
//! A SWIM failure detector, a gossip protocol and a membership protocol that
//! reconciles both into one converged view, composed by `Cluster`.
pub mod api;
pub mod cli;
pub mod cluster;
pub mod error;
pub mod events;
pub mod fdetector;
pub mod gossip;
pub mod membership;
pub mod settings;
pub mod transport;

pub use cluster::Cluster;
pub use error::{GossamerError, Result};
pub use membership::{MemberStatus, MembershipEvent, MembershipRecord};
pub use settings::ClusterConfig;
pub use transport::{Address, Message, Transport};
