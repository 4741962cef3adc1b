//! Builds per-receptor state frames from the simulation.
//!
//! A frame holds every entity the receptor's player can see, each written
//! as the most specific type that player is allowed to know about. Heroes
//! owned by somebody else are written as plain units so their inventory,
//! attributes and cooldowns never leave the server.

use crate::entity::{Entity, EntityBody, EntityTable, Unit};
use log::warn;
use shared::codec::{self, CodecError, FrameObject};
use shared::{
    DoodadRecord, EffectRecord, EntityRecord, Guid, HeroRecord, ObjectRecord, ObjectType,
    PlayerId, PlayerInput, UnitRecord,
};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// An entity paired with the type it is written as. Equality and hashing
/// look at the entity's identity only.
#[derive(Debug, Clone, Copy)]
pub struct ObjectData<'a> {
    pub entity: &'a Entity,
    pub write_as: ObjectType,
}

impl PartialEq for ObjectData<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity.id == other.entity.id
    }
}

impl Eq for ObjectData<'_> {}

impl Hash for ObjectData<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.id.hash(state);
    }
}

impl<'a> ObjectData<'a> {
    /// Picks the type `entity` is written as for `receptor`.
    pub fn for_receptor(entity: &'a Entity, receptor: PlayerId) -> Self {
        let write_as = match entity.object_type() {
            ObjectType::Hero => match entity.as_unit() {
                Some(unit) if unit.owner == receptor => ObjectType::Hero,
                _ => ObjectType::Unit,
            },
            other => other,
        };
        Self { entity, write_as }
    }

    pub fn to_frame_object(&self) -> Option<FrameObject> {
        let entity = self.entity;
        let record = match (self.write_as, &entity.body) {
            (ObjectType::Unit, EntityBody::Unit(unit)) => {
                ObjectRecord::Unit(unit_record(entity, unit))
            }
            (ObjectType::Hero, EntityBody::Unit(unit)) => {
                ObjectRecord::Hero(hero_record(entity, unit)?)
            }
            (ObjectType::Doodad, EntityBody::Doodad) => ObjectRecord::Doodad(DoodadRecord {
                entity: entity_record(entity),
                has_collision: entity.has_collision,
            }),
            (ObjectType::Effect, EntityBody::Effect { remaining_ms }) => {
                ObjectRecord::Effect(EffectRecord {
                    entity: entity_record(entity),
                    remaining_ms: *remaining_ms,
                })
            }
            _ => return None,
        };
        Some(FrameObject {
            guid: entity.id,
            record,
        })
    }
}

fn entity_record(entity: &Entity) -> EntityRecord {
    EntityRecord {
        position: entity.position,
        scale: entity.scale(),
        orientation: entity.orientation,
        model: entity.model.clone(),
        animation: entity.animation.clone(),
        loop_animation: entity.loop_animation,
    }
}

fn unit_record(entity: &Entity, unit: &Unit) -> UnitRecord {
    UnitRecord {
        entity: entity_record(entity),
        owner_id: unit.owner,
        level: unit.stats.level,
        life: unit.life,
        max_life: unit.stats.max_life,
        mana: unit.mana,
        max_mana: unit.stats.max_mana,
        move_speed: unit.stats.move_speed,
        is_dead: unit.is_dead,
        movement: unit.movement_state,
        order: unit.arbiter.displayed_kind(),
    }
}

fn hero_record(entity: &Entity, unit: &Unit) -> Option<HeroRecord> {
    let hero = unit.hero.as_ref()?;
    Some(HeroRecord {
        unit: unit_record(entity, unit),
        experience: hero.experience,
        strength: hero.strength,
        vitality: hero.vitality,
        intellect: hero.intellect,
        agility: hero.agility,
        inventory: hero.inventory.clone(),
        ability_cooldowns: unit
            .abilities
            .iter()
            .map(|a| (a.id, a.current_cooldown_ms))
            .collect(),
    })
}

/// Collects the objects of one frame. Adding the same entity twice keeps
/// the first entry.
#[derive(Debug, Default)]
pub struct FrameSerializer<'a> {
    objects: HashSet<ObjectData<'a>>,
}

impl<'a> FrameSerializer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, data: ObjectData<'a>) -> bool {
        self.objects.insert(data)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Frame objects in guid order.
    pub fn frame_objects(&self) -> Vec<FrameObject> {
        let mut objects: Vec<FrameObject> = self
            .objects
            .iter()
            .filter_map(ObjectData::to_frame_object)
            .collect();
        objects.sort_by_key(|o| o.guid);
        objects
    }

    pub fn encode(&self, frame_id: u32) -> Result<Vec<u8>, CodecError> {
        codec::encode_server_frame(frame_id, &self.frame_objects())
    }
}

/// Encodes the frame `receptor` gets for the entities in `visible`. Guids
/// that no longer resolve to an entity are skipped.
pub fn write_server_frame<'a>(
    frame_id: u32,
    receptor: PlayerId,
    visible: impl IntoIterator<Item = &'a Guid>,
    entities: &EntityTable,
) -> Result<Vec<u8>, CodecError> {
    let mut serializer = FrameSerializer::new();
    for guid in visible {
        if let Some(entity) = entities.get(*guid) {
            serializer.add(ObjectData::for_receptor(entity, receptor));
        }
    }
    serializer.encode(frame_id)
}

/// Decodes a client input frame; malformed frames are logged and dropped.
pub fn try_read_client_frame(bytes: &[u8]) -> Option<(u32, PlayerInput)> {
    match codec::decode_client_frame(bytes) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Dropping malformed client frame ({} bytes): {}", bytes.len(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Ability, HeroData, UnitStats};
    use shared::codec::decode_server_frame;
    use shared::{MovementState, Vector2};

    fn world_with_hero(owner: PlayerId) -> (EntityTable, Guid) {
        let mut world = EntityTable::new();
        let mut unit = Unit::new(owner, UnitStats::default());
        unit.hero = Some(HeroData {
            experience: 120,
            strength: 5.0,
            inventory: vec![11, 12],
            ..HeroData::default()
        });
        let mut fireball = Ability::attack(4, 6.0, 30.0, 2000);
        fireball.current_cooldown_ms = 750;
        unit.abilities.push(fireball);
        let hero = world.insert(Entity::unit("Hero", "hero", unit).at(Vector2::new(2.0, 3.0)));
        (world, hero)
    }

    #[test]
    fn test_rival_hero_is_written_as_unit() {
        let (world, hero) = world_with_hero(5);
        let bytes = write_server_frame(1, 6, &[hero], &world).unwrap();
        let frame = decode_server_frame(&bytes).unwrap();

        assert_eq!(frame.objects.len(), 1);
        match &frame.objects[0].record {
            ObjectRecord::Unit(unit) => {
                assert_eq!(unit.owner_id, 5);
                assert_eq!(unit.entity.position, Vector2::new(2.0, 3.0));
            }
            other => panic!("rival hero leaked as {:?}", other.object_type()),
        }
    }

    #[test]
    fn test_own_hero_is_written_in_full() {
        let (world, hero) = world_with_hero(5);
        let bytes = write_server_frame(1, 5, &[hero], &world).unwrap();
        let frame = decode_server_frame(&bytes).unwrap();

        match &frame.objects[0].record {
            ObjectRecord::Hero(record) => {
                assert_eq!(record.experience, 120);
                assert_eq!(record.inventory, vec![11, 12]);
                assert_eq!(record.ability_cooldowns, vec![(4, 750)]);
            }
            other => panic!("own hero written as {:?}", other.object_type()),
        }
    }

    #[test]
    fn test_duplicate_entities_are_written_once() {
        let (mut world, hero) = world_with_hero(5);
        let tree = world.insert(Entity::doodad("Tree", "tree", true));

        let bytes = write_server_frame(9, 5, &[tree, hero, tree, hero], &world).unwrap();
        let frame = decode_server_frame(&bytes).unwrap();
        assert_eq!(frame.frame_id, 9);
        let guids: Vec<Guid> = frame.objects.iter().map(|o| o.guid).collect();
        assert_eq!(guids, vec![hero, tree]);
    }

    #[test]
    fn test_object_data_identity_ignores_write_as() {
        let (world, hero) = world_with_hero(5);
        let entity = world.get(hero).unwrap();

        let mut serializer = FrameSerializer::new();
        assert!(serializer.add(ObjectData::for_receptor(entity, 5)));
        assert!(!serializer.add(ObjectData::for_receptor(entity, 6)));
        assert_eq!(serializer.len(), 1);
        assert_eq!(serializer.frame_objects()[0].write_as(), ObjectType::Hero);
    }

    #[test]
    fn test_missing_entities_are_skipped() {
        let (world, hero) = world_with_hero(5);
        let bytes = write_server_frame(2, 5, &[hero, 4242], &world).unwrap();
        assert_eq!(decode_server_frame(&bytes).unwrap().objects.len(), 1);
    }

    #[test]
    fn test_effect_keeps_remaining_time() {
        let mut world = EntityTable::new();
        let flash = world.insert(Entity::effect("Impact", "impact", Some(300)));
        let bytes = write_server_frame(2, 5, &[flash], &world).unwrap();
        match &decode_server_frame(&bytes).unwrap().objects[0].record {
            ObjectRecord::Effect(e) => assert_eq!(e.remaining_ms, Some(300)),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_serializing_leaves_world_untouched() {
        let (world, hero) = world_with_hero(5);
        let before = format!("{:?}", world.get(hero));
        write_server_frame(1, 6, &[hero], &world).unwrap();
        assert_eq!(format!("{:?}", world.get(hero)), before);
    }

    #[test]
    fn test_client_frame_reading() {
        let input = PlayerInput {
            movement: MovementState::towards(1.5),
            action_id: 4,
            action_target_id: Some(8),
            action_target_location: None,
        };
        let bytes = codec::encode_client_frame(77, &input).unwrap();
        assert_eq!(try_read_client_frame(&bytes), Some((77, input)));
        assert_eq!(try_read_client_frame(&bytes[..bytes.len() - 1]), None);
        assert_eq!(try_read_client_frame(&[]), None);
    }
}
