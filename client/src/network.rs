use crate::chunk_cache::{Camera, ChunkCache};
use crate::game::ClientWorld;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, PlayerInput, Vector2, CHUNK_SIZE};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub player_name: String,
    /// Visible area in world units, used to pick terrain chunks.
    pub viewport: Vector2,
    pub input_interval: Duration,
    /// Walk the hero in slow circles instead of standing still.
    pub wander: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", shared::DEFAULT_PORT),
            player_name: "player".to_string(),
            viewport: Vector2::new(32.0, 18.0),
            input_interval: Duration::from_millis(50),
            wander: false,
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: ClientConfig,
    connected: bool,

    world: ClientWorld,
    chunks: ChunkCache,
    input: PlayerInput,
    started: Instant,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = config.server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            config,
            connected: false,
            world: ClientWorld::new(),
            chunks: ChunkCache::new(),
            input: PlayerInput::default(),
            started: Instant::now(),
        })
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn chunks(&self) -> &ChunkCache {
        &self.chunks
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.world.player_id()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Input sent with every following frame.
    pub fn set_input(&mut self, input: PlayerInput) {
        self.input = input;
    }

    pub async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {} as {:?}", self.server_addr, self.config.player_name);

        let packet = Packet::HandshakeInit {
            player_name: self.config.player_name.clone(),
        };
        self.send_packet(&packet).await
    }

    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connected {
            self.connected = false;
            self.send_packet(&Packet::Disconnect).await?;
        }
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::HandshakeReply {
                player_id,
                scenario_config,
                content_bundle,
            } => {
                info!(
                    "Connected as player {} ({} bytes of scenario, {} bytes of content)",
                    player_id,
                    scenario_config.len(),
                    content_bundle.len()
                );
                self.world.set_player_id(player_id);
                self.connected = true;
            }

            Packet::ServerFrame { data } => {
                if !self.connected {
                    return;
                }
                if let Err(e) = self.world.apply_frame_bytes(&data) {
                    warn!("Dropping malformed server frame: {}", e);
                }
            }

            Packet::MapData(transfer) => {
                self.chunks.handle_terrain(&transfer);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
            }

            _ => {
                warn!("Unexpected packet type from server");
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn send_input(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }
        if self.config.wander {
            let angle = self.started.elapsed().as_secs_f32() * 0.25;
            self.input.movement = shared::MovementState::towards(angle);
        }

        let data = self.world.next_input_frame(&self.input)?;
        self.send_packet(&Packet::ClientFrame { data }).await
    }

    /// Centers the camera on our hero and requests missing terrain.
    async fn stream_terrain(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some((_, hero)) = self.world.own_hero() {
            let center = hero.unit.entity.position;
            self.chunks.set_camera(Camera::new(center, self.config.viewport));
        }

        let now = self.elapsed_ms();
        self.chunks.update(now, CHUNK_SIZE as f32 / 2.0);
        for chunk in self.chunks.drain_requests() {
            debug!("Requesting chunk {:?}", chunk);
            self.send_packet(&Packet::MapRequest { chunk }).await?;
        }
        Ok(())
    }

    /// Runs until the server disconnects us.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(self.config.input_interval);
        let mut terrain_interval = interval(Duration::from_millis(250));
        let mut status_interval = interval(Duration::from_secs(5));
        let mut handshake_retry = interval(Duration::from_secs(1));

        let mut buffer = vec![0u8; 64 * 1024];

        // the first tick fires immediately and we just sent the handshake
        handshake_retry.tick().await;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(packet) => {
                                let refused = matches!(packet, Packet::Disconnected { .. });
                                self.handle_packet(packet);
                                if refused {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping undecodable datagram: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.send_input().await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = terrain_interval.tick() => {
                    if self.connected {
                        if let Err(e) = self.stream_terrain().await {
                            error!("Error requesting terrain: {}", e);
                        }
                    }
                },

                _ = handshake_retry.tick() => {
                    if !self.connected {
                        self.connect().await?;
                    }
                },

                _ = status_interval.tick() => {
                    if self.connected {
                        info!(
                            "Frame {:?}: {} objects visible, {} terrain chunks cached",
                            self.world.last_frame_id(),
                            self.world.len(),
                            self.chunks.len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
