//! Typed records describing what an observer may know about an object.
//!
//! The server builds one record per visible entity and the client rebuilds
//! its object stubs from them. A record's variant is the type the object is
//! *written as*, which may be less specific than its real type: a hero owned
//! by someone else travels as a plain [`UnitRecord`].

use crate::{MovementState, PlayerId, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Unit,
    Hero,
    Doodad,
    Effect,
}

impl ObjectType {
    pub fn tag(self) -> u8 {
        match self {
            ObjectType::Unit => 1,
            ObjectType::Hero => 2,
            ObjectType::Doodad => 3,
            ObjectType::Effect => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ObjectType::Unit),
            2 => Some(ObjectType::Hero),
            3 => Some(ObjectType::Doodad),
            4 => Some(ObjectType::Effect),
            _ => None,
        }
    }
}

/// Kind of order a unit is currently executing, as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderKind {
    #[default]
    Idle,
    MoveDirection,
    MoveToGround,
    MoveToUnit,
    MoveAttack,
    SpamCast,
    OrderList,
    Aggro,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    pub position: Vector2,
    pub scale: f32,
    pub orientation: f32,
    pub model: String,
    pub animation: String,
    pub loop_animation: bool,
}

/// Fields of a unit visible to any observer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitRecord {
    pub entity: EntityRecord,
    pub owner_id: PlayerId,
    pub level: u32,
    pub life: f32,
    pub max_life: f32,
    pub mana: f32,
    pub max_mana: f32,
    pub move_speed: f32,
    pub is_dead: bool,
    pub movement: MovementState,
    pub order: OrderKind,
}

/// Owner-only hero details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeroRecord {
    pub unit: UnitRecord,
    pub experience: u32,
    pub strength: f32,
    pub vitality: f32,
    pub intellect: f32,
    pub agility: f32,
    pub inventory: Vec<u32>,
    /// (ability id, remaining cooldown in ms)
    pub ability_cooldowns: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DoodadRecord {
    pub entity: EntityRecord,
    pub has_collision: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectRecord {
    pub entity: EntityRecord,
    pub remaining_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectRecord {
    Unit(UnitRecord),
    Hero(HeroRecord),
    Doodad(DoodadRecord),
    Effect(EffectRecord),
}

impl ObjectRecord {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectRecord::Unit(_) => ObjectType::Unit,
            ObjectRecord::Hero(_) => ObjectType::Hero,
            ObjectRecord::Doodad(_) => ObjectType::Doodad,
            ObjectRecord::Effect(_) => ObjectType::Effect,
        }
    }

    pub fn entity(&self) -> &EntityRecord {
        match self {
            ObjectRecord::Unit(u) => &u.entity,
            ObjectRecord::Hero(h) => &h.unit.entity,
            ObjectRecord::Doodad(d) => &d.entity,
            ObjectRecord::Effect(e) => &e.entity,
        }
    }

    pub fn unit(&self) -> Option<&UnitRecord> {
        match self {
            ObjectRecord::Unit(u) => Some(u),
            ObjectRecord::Hero(h) => Some(&h.unit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_tags_are_distinct() {
        let all = [
            ObjectType::Unit,
            ObjectType::Hero,
            ObjectType::Doodad,
            ObjectType::Effect,
        ];
        for ty in all {
            assert_eq!(ObjectType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ObjectType::from_tag(0), None);
        assert_eq!(ObjectType::from_tag(200), None);
    }

    #[test]
    fn test_hero_record_exposes_unit_fields() {
        let mut hero = HeroRecord::default();
        hero.unit.owner_id = 4;
        hero.unit.entity.model = "hero".to_string();
        let record = ObjectRecord::Hero(hero);

        assert_eq!(record.object_type(), ObjectType::Hero);
        assert_eq!(record.unit().map(|u| u.owner_id), Some(4));
        assert_eq!(record.entity().model, "hero");
    }

    #[test]
    fn test_doodad_has_no_unit_fields() {
        let record = ObjectRecord::Doodad(DoodadRecord::default());
        assert!(record.unit().is_none());
    }
}
