pub mod codec;
pub mod objects;
pub mod terrain;

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

pub use objects::*;
pub use terrain::{MapChunkId, Rectangle, TerrainTransfer, TerrainType, CHUNK_SIZE};

/// Identity of any entity placed on the map.
pub type Guid = u32;
pub type PlayerId = u32;

pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_UNIT_SCALE: f32 = 0.8;
pub const MIN_SCALE: f32 = 0.05;
pub const MAX_SCALE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to(&self, other: Vector2) -> f32 {
        (other - *self).length()
    }

    /// Angle in radians of the vector pointing from `self` to `other`.
    pub fn angle_to(&self, other: Vector2) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn polar_projection(&self, angle: f32, distance: f32) -> Vector2 {
        Vector2::new(
            self.x + angle.cos() * distance,
            self.y + angle.sin() * distance,
        )
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: f32) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

/// Movement intent of a unit: whether it moves, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementState {
    pub is_moving: bool,
    pub direction: f32,
}

impl MovementState {
    pub fn stand() -> Self {
        Self::default()
    }

    pub fn towards(direction: f32) -> Self {
        Self {
            is_moving: true,
            direction,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.direction.is_finite()
    }
}

/// The fixed-schema input record a client sends every frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerInput {
    pub movement: MovementState,
    /// Ability to cast; zero means no action.
    pub action_id: u32,
    pub action_target_id: Option<Guid>,
    pub action_target_location: Option<Vector2>,
}

impl PlayerInput {
    /// Whether every float in the input is a real number.
    pub fn is_finite(&self) -> bool {
        self.movement.is_finite()
            && self
                .action_target_location
                .map_or(true, |point| point.is_finite())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    HandshakeInit {
        player_name: String,
    },
    HandshakeReply {
        player_id: PlayerId,
        scenario_config: Vec<u8>,
        content_bundle: Vec<u8>,
    },
    /// Client to server input frame, see [`codec::encode_client_frame`].
    ClientFrame {
        data: Vec<u8>,
    },
    /// Server to client state frame, see [`codec::encode_server_frame`].
    ServerFrame {
        data: Vec<u8>,
    },
    MapRequest {
        chunk: MapChunkId,
    },
    MapData(TerrainTransfer),
    Disconnect,
    Disconnected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_vector_distance() {
        let a = Vector2::new(1.0, 1.0);
        let b = Vector2::new(4.0, 5.0);
        assert_approx_eq!(a.distance_to(b), 5.0);
        assert_approx_eq!(b.distance_to(a), 5.0);
    }

    #[test]
    fn test_vector_angle_and_projection() {
        let origin = Vector2::new(2.0, 2.0);
        let angle = origin.angle_to(Vector2::new(2.0, 10.0));
        assert_approx_eq!(angle, FRAC_PI_2);

        let moved = origin.polar_projection(angle, 3.0);
        assert_approx_eq!(moved.x, 2.0, 1e-5);
        assert_approx_eq!(moved.y, 5.0, 1e-5);
    }

    #[test]
    fn test_input_finiteness() {
        assert!(PlayerInput::default().is_finite());

        let spinning = PlayerInput {
            movement: MovementState::towards(f32::NAN),
            ..PlayerInput::default()
        };
        assert!(!spinning.is_finite());

        let nowhere = PlayerInput {
            action_target_location: Some(Vector2::new(f32::INFINITY, 0.0)),
            ..PlayerInput::default()
        };
        assert!(!nowhere.is_finite());
    }

    #[test]
    fn test_packet_serialization_handshake() {
        let packet = Packet::HandshakeReply {
            player_id: 7,
            scenario_config: vec![1, 2, 3],
            content_bundle: vec![9; 16],
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::HandshakeReply {
                player_id,
                scenario_config,
                content_bundle,
            } => {
                assert_eq!(player_id, 7);
                assert_eq!(scenario_config, vec![1, 2, 3]);
                assert_eq!(content_bundle.len(), 16);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_map_data() {
        let span = Rectangle::new(0, 0, 2, 1);
        let packet = Packet::MapData(TerrainTransfer::tiles(
            span,
            vec![TerrainType::Grass, TerrainType::Water],
        ));
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_garbage_is_not_a_packet() {
        let garbage = [0xffu8, 0xff, 0xff, 0xff, 0x01];
        assert!(bincode::deserialize::<Packet>(&garbage).is_err());
    }
}
