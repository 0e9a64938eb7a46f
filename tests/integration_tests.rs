//! Integration tests for the chunkwire server
//!
//! These tests drive the server core through its transport contract and a
//! real UDP socket, checking behavior that spans several modules.

use assert_approx_eq::assert_approx_eq;
use protocol::{
    decode_batch, Batch, BlockPosition, ClientToServerHandshake, GamePacket, Login, PlayStatus,
    ProtocolRegistry, ProtocolVersion, Text, UpdateBlock,
};
use server::config::ServerConfig;
use server::dimension::DimensionId;
use server::network::{
    ConnectionHandle, MemoryTransport, TransportEvent, UdpTransport, CONNECTION_ACCEPTED,
    DATA_FRAME, DISCONNECT_NOTIFICATION, OPEN_CONNECTION, UNCONNECTED_PING, UNCONNECTED_PONG,
};
use server::server::Server;
use server::session::SessionState;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn started(config: ServerConfig) -> (Server<MemoryTransport>, MemoryTransport) {
    let transport = MemoryTransport::new();
    let mut server = Server::new(config, transport.clone()).unwrap();
    server.start().unwrap();
    (server, transport)
}

fn login(version: ProtocolVersion, name: &str, client_key: Vec<u8>) -> Vec<u8> {
    let protocols = ProtocolRegistry::with_defaults().unwrap();
    let registry = protocols.registry(version).unwrap();
    let mut batch = Batch::new();
    batch.add(Login {
        protocol: version.0,
        display_name: name.to_string(),
        client_key,
    });
    batch.encode(registry).unwrap()
}

fn join(server: &mut Server<MemoryTransport>, handle: u64, version: ProtocolVersion, name: &str) {
    server.handle_event(TransportEvent::Connected {
        handle: ConnectionHandle(handle),
        addr: format!("127.0.0.1:{}", 40_000 + handle).parse().unwrap(),
    });
    server.handle_event(TransportEvent::Packet {
        handle: ConnectionHandle(handle),
        bytes: login(version, name, Vec::new()),
    });
}

fn decoded(
    transport: &MemoryTransport,
    handle: u64,
    version: ProtocolVersion,
) -> Vec<GamePacket> {
    let protocols = ProtocolRegistry::with_defaults().unwrap();
    let registry = protocols.registry(version).unwrap();
    transport
        .batches_for(ConnectionHandle(handle))
        .iter()
        .flat_map(|bytes| decode_batch(bytes, registry).unwrap())
        .map(|packet| packet.unwrap())
        .collect()
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Two logins for the same handle never create a second session
    #[test]
    fn at_most_one_session_per_handle() {
        let (mut server, _) = started(ServerConfig::default());
        join(&mut server, 1, ProtocolVersion::V220, "alice");
        join(&mut server, 1, ProtocolVersion::V220, "alice");

        assert_eq!(server.sessions().len(), 1);
        let session = server.sessions().lookup(ConnectionHandle(1)).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.id(), 1);
    }

    /// Disconnect events for unknown or already removed handles are ignored
    #[test]
    fn disconnect_is_idempotent() {
        let (mut server, _) = started(ServerConfig::default());
        join(&mut server, 1, ProtocolVersion::V200, "alice");

        for _ in 0..3 {
            server.handle_event(TransportEvent::Disconnected {
                handle: ConnectionHandle(1),
            });
        }
        server.handle_event(TransportEvent::Disconnected {
            handle: ConnectionHandle(77),
        });
        assert!(server.sessions().is_empty());
    }

    /// Undecodable and unregistered packets leave the session usable
    #[test]
    fn unknown_packet_keeps_session_active() {
        let (mut server, transport) = started(ServerConfig::default());
        join(&mut server, 1, ProtocolVersion::V220, "alice");

        server.handle_packet(ConnectionHandle(1), &[0xfe, 0x01, 0x7e]);
        assert!(server.sessions().lookup(ConnectionHandle(1)).unwrap().is_active());

        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let mut batch = Batch::new();
        batch.add(Text::chat("alice", "still here"));
        let bytes = batch
            .encode(protocols.registry(ProtocolVersion::V220).unwrap())
            .unwrap();
        server.handle_packet(ConnectionHandle(1), &bytes);
        server.tick();

        let packets = decoded(&transport, 1, ProtocolVersion::V220);
        assert!(packets.contains(&GamePacket::Text(Text::chat("alice", "still here"))));
    }

    /// The full encrypted handshake derives the same key on both sides
    #[test]
    fn encryption_handshake() {
        let config = ServerConfig {
            use_encryption: true,
            ..ServerConfig::default()
        };
        let (mut server, transport) = started(config);
        let client_secret = p384::SecretKey::random(&mut rand::rngs::OsRng);

        server.on_connect(ConnectionHandle(1), None);
        server.handle_packet(
            ConnectionHandle(1),
            &login(
                ProtocolVersion::V201,
                "carol",
                client_secret.public_key().to_sec1_bytes().into_vec(),
            ),
        );
        server.tick();

        let packets = decoded(&transport, 1, ProtocolVersion::V201);
        let GamePacket::ServerToClientHandshake(handshake) = &packets[0] else {
            panic!("expected handshake, got {:?}", packets);
        };
        let server_key = p384::PublicKey::from_sec1_bytes(&handshake.public_key).unwrap();
        let client_key = server::crypto::derive_key(&client_secret, &server_key, &handshake.token);

        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let mut batch = Batch::new();
        batch.add(ClientToServerHandshake);
        let bytes = batch
            .encode(protocols.registry(ProtocolVersion::V201).unwrap())
            .unwrap();
        server.handle_packet(ConnectionHandle(1), &bytes);

        let session = server.sessions().lookup(ConnectionHandle(1)).unwrap();
        assert!(session.is_active());
        assert_eq!(session.encryption().key(), Some(&client_key));
    }
}

/// CHUNK BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    /// Sessions watching a chunk get its mutations once, encoded for their
    /// own version; sessions elsewhere get nothing
    #[test]
    fn mutations_reach_only_watchers() {
        let config = ServerConfig {
            view_radius: 1,
            ..ServerConfig::default()
        };
        let (mut server, transport) = started(config);
        join(&mut server, 1, ProtocolVersion::V220, "a");
        join(&mut server, 2, ProtocolVersion::V160, "b");
        join(&mut server, 3, ProtocolVersion::V200, "c");
        server.tick();

        // Move c far away so it stops watching the spawn chunks.
        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let mut batch = Batch::new();
        batch.add(protocol::MovePlayer {
            runtime_id: 3,
            position: protocol::Vector3::new(1600.0, 64.0, 1600.0),
            rotation: protocol::Rotation::with_head_yaw(0.0, 0.0, 0.0),
            mode: protocol::MovePlayer::MODE_TELEPORT,
            on_ground: false,
        });
        let bytes = batch
            .encode(protocols.registry(ProtocolVersion::V200).unwrap())
            .unwrap();
        server.handle_packet(ConnectionHandle(3), &bytes);
        let far = server.sessions().lookup(ConnectionHandle(3)).unwrap().location().unwrap();
        assert_approx_eq!(far.position.z, 1600.0);
        server.tick();
        transport.take();

        let overworld = server
            .levels_mut()
            .dimension_mut("world", DimensionId::Overworld)
            .unwrap();
        overworld.set_block(BlockPosition::new(3, 70, 5), 1, 0).unwrap();
        overworld.set_block(BlockPosition::new(4, 70, 5), 2, 3).unwrap();
        server.tick();

        for (handle, version) in [(1, ProtocolVersion::V220), (2, ProtocolVersion::V160)] {
            assert_eq!(transport.batches_for(ConnectionHandle(handle)).len(), 1);
            let packets = decoded(&transport, handle, version);
            assert_eq!(
                packets,
                vec![
                    GamePacket::UpdateBlock(UpdateBlock {
                        position: BlockPosition::new(3, 70, 5),
                        block_id: 1,
                        block_metadata: 0,
                        flags: UpdateBlock::FLAG_NONE,
                    }),
                    GamePacket::UpdateBlock(UpdateBlock {
                        position: BlockPosition::new(4, 70, 5),
                        block_id: 2,
                        block_metadata: 3,
                        flags: UpdateBlock::FLAG_NONE,
                    }),
                ]
            );
        }
        assert!(transport.batches_for(ConnectionHandle(3)).is_empty());

        // Delivered mutations are not sent again.
        transport.take();
        server.tick();
        assert!(transport.sent().is_empty());
    }

    /// Joining players learn about each other regardless of version
    #[test]
    fn cross_version_join_messages() {
        let (mut server, transport) = started(ServerConfig::default());
        join(&mut server, 1, ProtocolVersion::V220, "alice");
        server.tick();
        transport.take();

        join(&mut server, 2, ProtocolVersion::V160, "bob");
        server.tick();

        let to_alice = decoded(&transport, 1, ProtocolVersion::V220);
        assert!(to_alice
            .iter()
            .any(|p| matches!(p, GamePacket::AddEntity(entity) if entity.unique_id == 2)));
        assert!(to_alice.contains(&GamePacket::Text(Text::raw("bob joined the game"))));

        let to_bob = decoded(&transport, 2, ProtocolVersion::V160);
        assert_eq!(
            to_bob.last(),
            Some(&GamePacket::PlayStatus(PlayStatus::new(PlayStatus::PLAYER_SPAWN)))
        );
        assert!(to_bob
            .iter()
            .any(|p| matches!(p, GamePacket::AddEntity(entity) if entity.unique_id == 1)));
    }
}

/// TICK AND STATUS TESTS
mod tick_tests {
    use super::*;

    /// The announce snapshot changes on tick 20, not tick 19
    #[test]
    fn announce_refresh_on_twentieth_tick() {
        let (mut server, _) = started(ServerConfig::default());
        let status = server.subscribe_announce();
        join(&mut server, 1, ProtocolVersion::V220, "alice");

        for _ in 0..19 {
            server.tick();
        }
        assert_eq!(status.borrow().online_players, 0);

        server.tick();
        assert_eq!(status.borrow().online_players, 1);
        assert!(status.borrow().pong_string().starts_with("MCPE;"));
    }
}

/// REAL NETWORK TESTS
mod network_tests {
    use super::*;

    async fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 4096];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out")
            .unwrap();
        buf[..len].to_vec()
    }

    /// Ping, connect, log in and leave over a real socket
    #[tokio::test]
    async fn udp_login_round_trip() {
        let (transport, mut events) = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let server_addr = transport.local_addr().unwrap();
        let config = ServerConfig {
            motd: "itest".to_string(),
            ..ServerConfig::default()
        };
        let mut server = Server::new(config, transport).unwrap();
        server.start().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[UNCONNECTED_PING], server_addr).await.unwrap();
        let pong = recv(&client).await;
        assert_eq!(pong[0], UNCONNECTED_PONG);
        assert!(String::from_utf8_lossy(&pong[3..]).starts_with("MCPE;itest;220;"));

        client.send_to(&[OPEN_CONNECTION], server_addr).await.unwrap();
        assert_eq!(recv(&client).await, vec![CONNECTION_ACCEPTED]);
        let connected = events.recv().await.unwrap();
        assert!(matches!(connected, TransportEvent::Connected { .. }));
        server.handle_event(connected);

        let mut frame = vec![DATA_FRAME];
        frame.extend(login(ProtocolVersion::V220, "udp", Vec::new()));
        client.send_to(&frame, server_addr).await.unwrap();
        let packet = events.recv().await.unwrap();
        server.handle_event(packet);
        assert_eq!(server.sessions().active_count(), 1);

        client.send_to(&[DISCONNECT_NOTIFICATION], server_addr).await.unwrap();
        let gone = events.recv().await.unwrap();
        assert!(matches!(gone, TransportEvent::Disconnected { .. }));
        server.handle_event(gone);
        assert!(server.sessions().is_empty());

        server.shutdown().unwrap();
    }
}
