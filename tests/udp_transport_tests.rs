#[cfg(test)]
mod udp_transport_tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;

    use gossamer::settings::TransportConfig;
    use gossamer::transport::udp_transport::MAX_DATAGRAM_SIZE;
    use gossamer::transport::UdpTransport;
    use gossamer::{Cluster, ClusterConfig, GossamerError, Message, Transport};
    use tokio::net::UdpSocket;
    use tokio::time::{sleep, timeout, Duration, Instant};

    fn loopback() -> TransportConfig {
        TransportConfig {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            public_address: None,
        }
    }

    #[tokio::test]
    async fn test_bind_reports_bound_address() {
        let transport = UdpTransport::bind(&loopback()).await.unwrap();
        let address = transport.local_address();

        assert_ne!(address.port(), 0);
        assert_eq!(transport.bound_address().unwrap(), address);
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_public_address_is_advertised() {
        let public = "10.1.2.3:4801".parse().unwrap();
        let config = TransportConfig {
            public_address: Some(public),
            ..loopback()
        };
        let transport = UdpTransport::bind(&config).await.unwrap();

        assert_eq!(transport.local_address(), public);
        assert_ne!(transport.bound_address().unwrap(), public);
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_send_and_listen() {
        let a = UdpTransport::bind(&loopback()).await.unwrap();
        let b = UdpTransport::bind(&loopback()).await.unwrap();
        let mut orders = b.listen("orders/created");
        let mut everything = b.listen_all();

        let message = Message::new("orders/created")
            .with_correlation_id("order-1")
            .with_bytes(b"payload".to_vec());
        a.send(b.local_address(), message).await.unwrap();

        let received = timeout(Duration::from_secs(1), orders.recv())
            .await
            .expect("Timed out waiting for message")
            .unwrap();
        assert_eq!(received.sender, Some(a.local_address()));
        assert_eq!(received.correlation_id.as_deref(), Some("order-1"));
        assert_eq!(received.data, b"payload".to_vec());

        let copy = timeout(Duration::from_secs(1), everything.recv()).await.unwrap().unwrap();
        assert_eq!(copy.qualifier, "orders/created");

        assert_eq!(a.stats().messages_sent.load(Ordering::Relaxed), 1);
        assert_eq!(b.stats().messages_received.load(Ordering::Relaxed), 1);

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn test_garbage_datagrams_are_dropped() {
        let transport = UdpTransport::bind(&loopback()).await.unwrap();
        let mut inbox = transport.listen_all();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&[0xff, 0x00, 0x13, 0x37], transport.local_address())
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        while transport.stats().receive_errors.load(Ordering::Relaxed) == 0 {
            assert!(Instant::now() < deadline, "garbage datagram was not counted");
            sleep(Duration::from_millis(10)).await;
        }
        assert!(inbox.try_recv().is_none());

        // The receive loop survives the bad datagram
        let peer = UdpTransport::bind(&loopback()).await.unwrap();
        peer.send(transport.local_address(), Message::new("still/alive"))
            .await
            .unwrap();
        let message = timeout(Duration::from_secs(1), inbox.recv()).await.unwrap().unwrap();
        assert_eq!(message.qualifier, "still/alive");

        peer.stop().await;
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_oversize_message_is_rejected() {
        let a = UdpTransport::bind(&loopback()).await.unwrap();
        let b = UdpTransport::bind(&loopback()).await.unwrap();

        let message = Message::new("bulk").with_bytes(vec![7u8; MAX_DATAGRAM_SIZE + 1]);
        let result = a.send(b.local_address(), message).await;

        assert!(matches!(result, Err(GossamerError::Transport(_))));
        assert_eq!(a.stats().send_errors.load(Ordering::Relaxed), 1);
        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn test_stop_completes_subscriptions_and_rejects_sends() {
        let a = UdpTransport::bind(&loopback()).await.unwrap();
        let mut inbox = a.listen("orders/created");

        a.stop().await;
        a.stop().await;

        let ended = timeout(Duration::from_millis(500), inbox.recv()).await.unwrap();
        assert!(ended.is_none());
        let result = a.send("127.0.0.1:9".parse().unwrap(), Message::new("orders/created")).await;
        assert!(result.is_err());
    }

    fn udp_cluster_config(seeds: Vec<gossamer::Address>) -> ClusterConfig {
        let mut config = ClusterConfig::with_seeds(seeds);
        config.transport = loopback();
        config.failure_detector.ping_time = Duration::from_millis(200);
        config.failure_detector.ping_timeout = Duration::from_millis(100);
        config.gossip.gossip_interval = Duration::from_millis(30);
        config.membership.sync_timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test]
    async fn test_cluster_over_udp() {
        let a = Cluster::join(udp_cluster_config(vec![])).await.unwrap();
        let b = Cluster::join(udp_cluster_config(vec![a.address()])).await.unwrap();

        let expected: BTreeSet<String> =
            [a.member_id().to_string(), b.member_id().to_string()].into();
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let view_a: BTreeSet<String> = a.members().into_iter().map(|m| m.id).collect();
            let view_b: BTreeSet<String> = b.members().into_iter().map(|m| m.id).collect();
            if view_a == expected && view_b == expected {
                break;
            }
            assert!(Instant::now() < deadline, "views did not converge: {:?} {:?}", view_a, view_b);
            sleep(Duration::from_millis(50)).await;
        }

        let mut inbox = a.listen();
        b.send(a.address(), Message::new("orders/created")).await.unwrap();
        let message = timeout(Duration::from_secs(1), inbox.recv()).await.unwrap().unwrap();
        assert_eq!(message.sender, Some(b.address()));

        b.shutdown().await.unwrap();
        a.shutdown().await.unwrap();
    }
}
