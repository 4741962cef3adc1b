//! Server network layer handling UDP communications and game loop coordination

use crate::game::{GameState, SimulationConfig};
use crate::receptor::{ReceptorManager, RECEPTOR_TIMEOUT};
use crate::serializer::{try_read_client_frame, write_server_frame};
use crate::terrain::{chunk_transfer, TerrainMap};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, DEFAULT_PORT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Largest datagram the server accepts.
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_receptors: usize,
    pub receptor_timeout: Duration,
    /// Opaque scenario configuration handed to clients on handshake.
    pub scenario_config: Vec<u8>,
    /// Opaque content bundle handed to clients on handshake.
    pub content_bundle: Vec<u8>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            tick_duration: Duration::from_millis(50),
            max_receptors: 16,
            receptor_timeout: RECEPTOR_TIMEOUT,
            scenario_config: Vec::new(),
            content_bundle: Vec::new(),
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ReceptorTimeout { player: PlayerId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    receptors: Arc<RwLock<ReceptorManager>>,
    game_state: GameState,
    terrain: Box<dyn TerrainMap + Send + Sync>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        simulation: SimulationConfig,
        terrain: Box<dyn TerrainMap + Send + Sync>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            receptors: Arc::new(RwLock::new(ReceptorManager::new(config.max_receptors))),
            config,
            game_state: GameState::new(simulation),
            terrain,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn game_state_mut(&mut self) -> &mut GameState {
        &mut self.game_state
    }

    /// Channel into the main loop; sending [`ServerMessage::Shutdown`] stops it.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Dropping undecodable datagram ({} bytes) from {}", len, addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { packet, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors receptor timeouts
    async fn spawn_timeout_checker(&self) {
        let receptors = Arc::clone(&self.receptors);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.receptor_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut guard = receptors.write().await;
                    guard.check_timeouts(timeout)
                };

                for player in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ReceptorTimeout { player }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn drop_player(&mut self, player: PlayerId) {
        self.receptors.write().await.remove_receptor(player);
        self.game_state.remove_player(player);
    }

    /// Processes incoming packets and updates game state
    pub async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let known = self.receptors.read().await.find_by_addr(addr);
        if let Some(player) = known {
            if let Some(receptor) = self.receptors.write().await.get_mut(player) {
                receptor.touch();
            }
        }

        match packet {
            Packet::HandshakeInit { player_name } => {
                info!("Handshake from {} as {:?}", addr, player_name);

                // Replace an existing session from the same address
                if let Some(existing) = known {
                    info!("Replacing session of player {} from {}", existing, addr);
                    self.drop_player(existing).await;
                }

                if !self.receptors.read().await.has_capacity() {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let player = self.game_state.add_human_player(&player_name);
                if self.game_state.spawn_hero(player).is_none() {
                    warn!("Could not spawn a hero for player {}", player);
                }
                self.receptors.write().await.add_receptor(player, addr);

                self.send_packet(
                    Packet::HandshakeReply {
                        player_id: player,
                        scenario_config: self.config.scenario_config.clone(),
                        content_bundle: self.config.content_bundle.clone(),
                    },
                    addr,
                );
            }

            Packet::ClientFrame { data } => {
                let Some(player) = known else {
                    debug!("Client frame from unknown address {}", addr);
                    return;
                };
                if let Some((frame_id, input)) = try_read_client_frame(&data) {
                    self.receptors
                        .write()
                        .await
                        .submit_input(player, frame_id, input);
                }
            }

            Packet::MapRequest { chunk } => {
                if known.is_none() {
                    debug!("Map request from unknown address {}", addr);
                    return;
                }
                if !chunk.is_valid() {
                    warn!("Dropping map request for out-of-range chunk {:?} from {}", chunk, addr);
                    return;
                }
                let transfer = chunk_transfer(self.terrain.as_ref(), chunk);
                self.send_packet(Packet::MapData(transfer), addr);
            }

            Packet::Disconnect => {
                if let Some(player) = known {
                    self.drop_player(player).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies the newest input of every receptor to its player
    async fn process_inputs(&mut self) {
        let inputs: Vec<_> = {
            let mut receptors = self.receptors.write().await;
            receptors
                .iter_mut()
                .filter_map(|r| r.take_input().map(|input| (r.id, input)))
                .collect()
        };
        for (player, input) in inputs {
            self.game_state.apply_input(player, &input);
        }
    }

    /// Sends every receptor the frame of what its player can see
    async fn send_frames(&mut self) {
        let mut receptors = self.receptors.write().await;
        let players = receptors.ids();
        for &player in &players {
            let Some(receptor) = receptors.get_mut(player) else {
                continue;
            };
            let Some(visible) = self.game_state.visible_entities(player) else {
                continue;
            };
            let frame_id = receptor.next_frame_id();
            let addr = receptor.addr;

            match write_server_frame(frame_id, player, visible, self.game_state.entities()) {
                Ok(data) => self.send_packet(Packet::ServerFrame { data }, addr),
                Err(e) => error!("Failed to encode frame for player {}: {}", player, e),
            }
        }
        drop(receptors);

        for player in players {
            let events = self.game_state.drain_visibility_events(player);
            if !events.is_empty() {
                debug!("Player {}: {} visibility changes", player, events.len());
            }
        }
    }

    /// Runs one simulation step of `ms_elapsed` and sends the frames
    pub async fn tick(&mut self, ms_elapsed: u32) {
        self.process_inputs().await;
        self.game_state.update(ms_elapsed);
        self.send_frames().await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.config.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ReceptorTimeout { player }) => {
                            self.game_state.remove_player(player);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let ms = now.duration_since(last_tick).as_millis().min(u32::MAX as u128) as u32;
                    last_tick = now;

                    self.tick(ms).await;

                    if self.game_state.tick % 100 == 0 {
                        let receptor_count = self.receptors.read().await.len();
                        if receptor_count > 0 {
                            debug!("Tick {}: {} receptors, {} entities",
                                   self.game_state.tick, receptor_count,
                                   self.game_state.entities().len());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::GridTerrain;
    use shared::codec::{decode_server_frame, encode_client_frame};
    use shared::{MapChunkId, MovementState, PlayerInput, TerrainType};
    use std::net::{IpAddr, Ipv4Addr};

    async fn test_server() -> Server {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            scenario_config: vec![1, 2, 3],
            ..ServerConfig::default()
        };
        let terrain = GridTerrain::filled(64, 64, TerrainType::Grass);
        Server::new(config, SimulationConfig::default(), Box::new(terrain))
            .await
            .unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn sent(server: &mut Server) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(GameMessage::SendPacket { packet, .. }) = server.game_rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    async fn handshake(server: &mut Server, port: u16) -> PlayerId {
        server
            .handle_packet(
                Packet::HandshakeInit {
                    player_name: "alice".to_string(),
                },
                addr(port),
            )
            .await;
        match sent(server).pop() {
            Some(Packet::HandshakeReply {
                player_id,
                scenario_config,
                ..
            }) => {
                assert_eq!(scenario_config, vec![1, 2, 3]);
                player_id
            }
            other => panic!("expected handshake reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_creates_player_and_hero() {
        let mut server = test_server().await;
        let player = handshake(&mut server, 4000).await;

        let game = server.game_state();
        assert!(game.players().get(player).unwrap().main_hero().is_some());
        assert_eq!(server.receptors.read().await.find_by_addr(addr(4000)), Some(player));
    }

    #[tokio::test]
    async fn test_repeated_handshake_replaces_session() {
        let mut server = test_server().await;
        let first = handshake(&mut server, 4000).await;
        let second = handshake(&mut server, 4000).await;

        assert_ne!(first, second);
        assert!(server.game_state().players().get(first).is_none());
        assert_eq!(server.receptors.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_full_server_refuses_handshake() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            max_receptors: 1,
            ..ServerConfig::default()
        };
        let terrain = GridTerrain::filled(8, 8, TerrainType::Dirt);
        let mut server = Server::new(config, SimulationConfig::default(), Box::new(terrain))
            .await
            .unwrap();
        handshake(&mut server, 4000).await;

        server
            .handle_packet(
                Packet::HandshakeInit {
                    player_name: "bob".to_string(),
                },
                addr(4001),
            )
            .await;
        assert!(matches!(
            sent(&mut server).pop(),
            Some(Packet::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_tick_sends_frame_with_own_hero() {
        let mut server = test_server().await;
        let player = handshake(&mut server, 4000).await;
        let hero = server.game_state().players().get(player).unwrap().main_hero().unwrap();

        server.tick(50).await;
        let frames: Vec<Vec<u8>> = sent(&mut server)
            .into_iter()
            .filter_map(|p| match p {
                Packet::ServerFrame { data } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 1);

        let frame = decode_server_frame(&frames[0]).unwrap();
        assert_eq!(frame.frame_id, 0);
        assert!(frame.objects.iter().any(|o| o.guid == hero));
    }

    #[tokio::test]
    async fn test_client_frame_moves_hero() {
        let mut server = test_server().await;
        let player = handshake(&mut server, 4000).await;
        let hero = server.game_state().players().get(player).unwrap().main_hero().unwrap();
        let start = server.game_state().entities().get(hero).unwrap().position;

        let input = PlayerInput {
            movement: MovementState::towards(0.0),
            ..PlayerInput::default()
        };
        let data = encode_client_frame(1, &input).unwrap();
        server
            .handle_packet(Packet::ClientFrame { data }, addr(4000))
            .await;
        server.tick(100).await;

        let pos = server.game_state().entities().get(hero).unwrap().position;
        assert!(pos.x > start.x);
    }

    #[tokio::test]
    async fn test_malformed_client_frame_is_ignored() {
        let mut server = test_server().await;
        let player = handshake(&mut server, 4000).await;
        server
            .handle_packet(Packet::ClientFrame { data: vec![1, 2] }, addr(4000))
            .await;
        assert_eq!(
            server.receptors.read().await.get(player).unwrap().last_input_frame,
            None
        );
    }

    #[tokio::test]
    async fn test_map_request_is_answered() {
        let mut server = test_server().await;
        handshake(&mut server, 4000).await;

        server
            .handle_packet(
                Packet::MapRequest {
                    chunk: MapChunkId::new(0, 0),
                },
                addr(4000),
            )
            .await;
        match sent(&mut server).pop() {
            Some(Packet::MapData(transfer)) => {
                assert!(transfer.has_map());
                assert_eq!(transfer.tile_at(0, 0), Some(TerrainType::Grass));
            }
            other => panic!("expected map data, got {:?}", other),
        }

        // strangers get nothing
        server
            .handle_packet(
                Packet::MapRequest {
                    chunk: MapChunkId::new(0, 0),
                },
                addr(4999),
            )
            .await;
        assert!(sent(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_map_request_is_dropped() {
        let mut server = test_server().await;
        handshake(&mut server, 4000).await;

        for chunk in [
            MapChunkId::new(i32::MAX / 32, 0),
            MapChunkId::new(0, i32::MIN),
        ] {
            server
                .handle_packet(Packet::MapRequest { chunk }, addr(4000))
                .await;
        }
        assert!(sent(&mut server).is_empty());

        // the server keeps answering afterwards
        server
            .handle_packet(
                Packet::MapRequest {
                    chunk: MapChunkId::new(-1, 0),
                },
                addr(4000),
            )
            .await;
        assert!(matches!(
            sent(&mut server).pop(),
            Some(Packet::MapData(transfer)) if !transfer.has_map()
        ));
    }

    #[tokio::test]
    async fn test_disconnect_drops_player() {
        let mut server = test_server().await;
        let player = handshake(&mut server, 4000).await;
        server.handle_packet(Packet::Disconnect, addr(4000)).await;

        assert!(server.game_state().players().get(player).is_none());
        assert!(server.receptors.read().await.is_empty());
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        assert!(tx.send(ServerMessage::ReceptorTimeout { player: 42 }).is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::ReceptorTimeout { player }) => assert_eq!(player, 42),
            other => panic!("Unexpected message {:?}", other),
        }
    }
}
