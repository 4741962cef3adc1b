//! Client-side view of the world.
//!
//! The client does not simulate. It keeps one stub per object from the most
//! recent server frame and numbers the input frames it sends back.

use log::debug;
use shared::codec::{
    decode_server_frame, encode_client_frame, frame_is_newer, CodecError, ServerFrame,
    MAX_FRAME_ID,
};
use shared::{Guid, HeroRecord, ObjectRecord, PlayerId, PlayerInput, Vector2};
use std::collections::HashMap;

/// Local copy of a replicated object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStub {
    pub guid: Guid,
    pub record: ObjectRecord,
    /// Frame the stub was last refreshed by.
    pub frame_id: u32,
}

impl ObjectStub {
    pub fn position(&self) -> Vector2 {
        self.record.entity().position
    }
}

#[derive(Debug, Default)]
pub struct ClientWorld {
    player_id: Option<PlayerId>,
    objects: HashMap<Guid, ObjectStub>,
    last_frame: Option<u32>,
    input_frame: u32,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Starts a new session: forgets every object and restarts frame
    /// numbering.
    pub fn set_player_id(&mut self, player: PlayerId) {
        *self = Self {
            player_id: Some(player),
            ..Self::default()
        };
    }

    pub fn last_frame_id(&self) -> Option<u32> {
        self.last_frame
    }

    /// Applies a decoded frame. Frames not newer than the last applied one
    /// are ignored. Objects missing from the frame are dropped.
    pub fn apply_frame(&mut self, frame: ServerFrame) -> bool {
        if let Some(last) = self.last_frame {
            if !frame_is_newer(frame.frame_id, last) {
                debug!("Ignoring stale frame {} (have {})", frame.frame_id, last);
                return false;
            }
        }

        let before = self.objects.len();
        let mut objects = HashMap::with_capacity(frame.objects.len());
        for object in frame.objects {
            objects.insert(
                object.guid,
                ObjectStub {
                    guid: object.guid,
                    record: object.record,
                    frame_id: frame.frame_id,
                },
            );
        }
        let appeared = objects
            .keys()
            .filter(|guid| !self.objects.contains_key(guid))
            .count();
        if appeared > 0 || objects.len() != before {
            debug!(
                "Frame {}: {} objects ({} new, {} gone)",
                frame.frame_id,
                objects.len(),
                appeared,
                before + appeared - objects.len()
            );
        }

        self.objects = objects;
        self.last_frame = Some(frame.frame_id);
        true
    }

    /// Decodes and applies a frame. A malformed frame changes nothing.
    pub fn apply_frame_bytes(&mut self, bytes: &[u8]) -> Result<bool, CodecError> {
        let frame = decode_server_frame(bytes)?;
        Ok(self.apply_frame(frame))
    }

    /// Encodes `input` as the next input frame.
    pub fn next_input_frame(&mut self, input: &PlayerInput) -> Result<Vec<u8>, CodecError> {
        let frame_id = self.input_frame;
        let data = encode_client_frame(frame_id, input)?;
        self.input_frame = if frame_id >= MAX_FRAME_ID { 0 } else { frame_id + 1 };
        Ok(data)
    }

    pub fn object(&self, guid: Guid) -> Option<&ObjectStub> {
        self.objects.get(&guid)
    }

    /// Objects sorted by guid.
    pub fn objects(&self) -> Vec<&ObjectStub> {
        let mut objects: Vec<&ObjectStub> = self.objects.values().collect();
        objects.sort_by_key(|o| o.guid);
        objects
    }

    /// The hero record sent with full detail, which is our own.
    pub fn own_hero(&self) -> Option<(Guid, &HeroRecord)> {
        let player = self.player_id?;
        self.objects.values().find_map(|stub| match &stub.record {
            ObjectRecord::Hero(hero) if hero.unit.owner_id == player => Some((stub.guid, hero)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
