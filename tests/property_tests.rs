use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use gossamer::fdetector::FailureDetector;
use gossamer::gossip::GossipProtocol;
use gossamer::settings::{FailureDetectorConfig, GossipConfig};
use gossamer::transport::MemoryNetwork;
use gossamer::{MemberStatus, MembershipRecord, Transport};
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = MemberStatus> {
    prop_oneof![
        Just(MemberStatus::Alive),
        Just(MemberStatus::Suspect),
        Just(MemberStatus::Dead),
    ]
}

fn record(status: MemberStatus, incarnation: u64) -> MembershipRecord {
    MembershipRecord {
        status,
        incarnation,
        ..MembershipRecord::new("member", "127.0.0.1:4801".parse().unwrap(), BTreeMap::new())
    }
}

fn address_strategy() -> impl Strategy<Value = SocketAddr> {
    (20000u16..20016).prop_map(|port| SocketAddr::from(([127, 0, 0, 1], port)))
}

proptest! {
    #[test]
    fn test_higher_incarnation_always_overrides(
        incarnation in 0u64..1_000_000,
        bump in 1u64..1000,
        old_status in status_strategy(),
        new_status in status_strategy(),
    ) {
        let current = record(old_status, incarnation);
        let newer = record(new_status, incarnation + bump);

        prop_assert!(newer.overrides(&current));
        prop_assert!(!current.overrides(&newer));
    }

    #[test]
    fn test_override_is_antisymmetric(
        a_incarnation in 0u64..8,
        b_incarnation in 0u64..8,
        a_status in status_strategy(),
        b_status in status_strategy(),
    ) {
        let a = record(a_status, a_incarnation);
        let b = record(b_status, b_incarnation);

        prop_assert!(!(a.overrides(&b) && b.overrides(&a)));
        if a == b {
            prop_assert!(!a.overrides(&b));
        } else {
            prop_assert!(a.overrides(&b) || b.overrides(&a));
        }
    }

    #[test]
    fn test_probe_targets_exclude_local_and_duplicates(
        addresses in prop::collection::vec(address_strategy(), 0..40),
    ) {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.bind_to("127.0.0.1:20000".parse().unwrap()).unwrap());
        let local = transport.local_address();
        let detector = FailureDetector::new(transport, FailureDetectorConfig::default());

        detector.set_cluster_members(addresses.clone());
        let members = detector.members();

        let unique: HashSet<SocketAddr> = members.iter().copied().collect();
        let expected: HashSet<SocketAddr> = addresses.into_iter().filter(|a| *a != local).collect();
        prop_assert_eq!(unique.len(), members.len());
        prop_assert!(!unique.contains(&local));
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn test_gossip_targets_exclude_local_and_duplicates(
        addresses in prop::collection::vec(address_strategy(), 0..40),
    ) {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.bind_to("127.0.0.1:20000".parse().unwrap()).unwrap());
        let local = transport.local_address();
        let gossip = GossipProtocol::new("local", transport, GossipConfig::default());

        gossip.set_cluster_members(addresses.clone());
        let members = gossip.members();

        let unique: HashSet<SocketAddr> = members.iter().copied().collect();
        let expected: HashSet<SocketAddr> = addresses.into_iter().filter(|a| *a != local).collect();
        prop_assert_eq!(unique.len(), members.len());
        prop_assert_eq!(unique, expected);
    }
}
