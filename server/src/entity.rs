//! Entities placed on the game map and the table that owns them.
//!
//! Every object on the map is an [`Entity`]; units and heroes carry an
//! additional [`Unit`] body with combat stats, abilities and orders.

use crate::arbiter::OrderArbiter;
use shared::{
    Guid, MovementState, ObjectType, PlayerId, Vector2, DEFAULT_UNIT_SCALE, MAX_SCALE, MIN_SCALE,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityTargetType {
    Passive,
    NoTarget,
    PointTarget,
    UnitTarget,
    PointOrUnitTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ability {
    pub id: u32,
    pub name: String,
    pub target_type: AbilityTargetType,
    pub cast_range: f32,
    pub cooldown_ms: u32,
    pub current_cooldown_ms: u32,
    pub mana_cost: f32,
    pub damage: f32,
    /// Whether autonomous behaviours may cast it whenever it is ready.
    pub spammable: bool,
}

impl Ability {
    /// A basic melee/ranged attack usable by autonomous units.
    pub fn attack(id: u32, cast_range: f32, damage: f32, cooldown_ms: u32) -> Self {
        Self {
            id,
            name: "Attack".to_string(),
            target_type: AbilityTargetType::UnitTarget,
            cast_range,
            cooldown_ms,
            current_cooldown_ms: 0,
            mana_cost: 0.0,
            damage,
            spammable: true,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current_cooldown_ms == 0
    }

    pub fn tick(&mut self, ms_elapsed: u32) {
        self.current_cooldown_ms = self.current_cooldown_ms.saturating_sub(ms_elapsed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitStats {
    pub level: u32,
    pub max_life: f32,
    pub max_mana: f32,
    /// Distance per second.
    pub move_speed: f32,
    pub vision_range: f32,
    pub defense: f32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            level: 1,
            max_life: 100.0,
            max_mana: 50.0,
            move_speed: 5.0,
            vision_range: 10.0,
            defense: 0.0,
        }
    }
}

/// Hero-only state, shown to the owning player only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeroData {
    pub experience: u32,
    pub strength: f32,
    pub vitality: f32,
    pub intellect: f32,
    pub agility: f32,
    pub inventory: Vec<u32>,
}

#[derive(Debug)]
pub struct Unit {
    pub owner: PlayerId,
    pub stats: UnitStats,
    pub life: f32,
    pub mana: f32,
    pub is_dead: bool,
    /// What the unit actually did during the last tick.
    pub movement_state: MovementState,
    /// Movement requested by the owning player's input.
    pub input_movement: MovementState,
    pub abilities: Vec<Ability>,
    pub arbiter: OrderArbiter,
    pub hero: Option<HeroData>,
}

impl Unit {
    pub fn new(owner: PlayerId, stats: UnitStats) -> Self {
        Self {
            owner,
            life: stats.max_life,
            mana: stats.max_mana,
            stats,
            is_dead: false,
            movement_state: MovementState::stand(),
            input_movement: MovementState::stand(),
            abilities: Vec::new(),
            arbiter: OrderArbiter::default(),
            hero: None,
        }
    }

    pub fn is_hero(&self) -> bool {
        self.hero.is_some()
    }

    pub fn ability(&self, id: u32) -> Option<&Ability> {
        self.abilities.iter().find(|a| a.id == id)
    }

    pub fn ability_mut(&mut self, id: u32) -> Option<&mut Ability> {
        self.abilities.iter_mut().find(|a| a.id == id)
    }
}

#[derive(Debug)]
pub enum EntityBody {
    Unit(Box<Unit>),
    Doodad,
    Effect { remaining_ms: Option<u32> },
}

#[derive(Debug)]
pub struct Entity {
    pub id: Guid,
    pub name: String,
    pub position: Vector2,
    scale: f32,
    pub orientation: f32,
    pub model: String,
    pub animation: String,
    pub loop_animation: bool,
    pub has_collision: bool,
    pub body: EntityBody,
}

impl Entity {
    fn with_body(name: &str, model: &str, body: EntityBody) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            position: Vector2::ZERO,
            scale: DEFAULT_UNIT_SCALE,
            orientation: 0.0,
            model: model.to_string(),
            animation: "stand".to_string(),
            loop_animation: true,
            has_collision: false,
            body,
        }
    }

    pub fn unit(name: &str, model: &str, unit: Unit) -> Self {
        let mut entity = Self::with_body(name, model, EntityBody::Unit(Box::new(unit)));
        entity.has_collision = true;
        entity
    }

    pub fn doodad(name: &str, model: &str, has_collision: bool) -> Self {
        let mut entity = Self::with_body(name, model, EntityBody::Doodad);
        entity.has_collision = has_collision;
        entity
    }

    pub fn effect(name: &str, model: &str, remaining_ms: Option<u32>) -> Self {
        Self::with_body(name, model, EntityBody::Effect { remaining_ms })
    }

    pub fn at(mut self, position: Vector2) -> Self {
        self.position = position;
        self
    }

    pub fn scaled(mut self, scale: f32) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    }

    pub fn object_type(&self) -> ObjectType {
        match &self.body {
            EntityBody::Unit(u) if u.is_hero() => ObjectType::Hero,
            EntityBody::Unit(_) => ObjectType::Unit,
            EntityBody::Doodad => ObjectType::Doodad,
            EntityBody::Effect { .. } => ObjectType::Effect,
        }
    }

    pub fn as_unit(&self) -> Option<&Unit> {
        match &self.body {
            EntityBody::Unit(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_unit_mut(&mut self) -> Option<&mut Unit> {
        match &mut self.body {
            EntityBody::Unit(u) => Some(u),
            _ => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.as_unit().map(|u| u.is_dead).unwrap_or(false)
    }

    pub fn play_animation(&mut self, animation: &str, looped: bool) {
        if self.animation != animation {
            self.animation = animation.to_string();
        }
        self.loop_animation = looped;
    }
}

/// Owner of every entity in a simulation. Guids are handed out on insert and
/// never reused.
#[derive(Debug)]
pub struct EntityTable {
    entities: HashMap<Guid, Entity>,
    next_guid: Guid,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_guid: 1,
        }
    }

    pub fn insert(&mut self, mut entity: Entity) -> Guid {
        let guid = self.next_guid;
        self.next_guid += 1;
        entity.id = guid;
        self.entities.insert(guid, entity);
        guid
    }

    pub fn remove(&mut self, guid: Guid) -> Option<Entity> {
        self.entities.remove(&guid)
    }

    pub fn get(&self, guid: Guid) -> Option<&Entity> {
        self.entities.get(&guid)
    }

    pub fn get_mut(&mut self, guid: Guid) -> Option<&mut Entity> {
        self.entities.get_mut(&guid)
    }

    pub fn contains(&self, guid: Guid) -> bool {
        self.entities.contains_key(&guid)
    }

    pub fn unit(&self, guid: Guid) -> Option<&Unit> {
        self.get(guid).and_then(Entity::as_unit)
    }

    pub fn unit_mut(&mut self, guid: Guid) -> Option<&mut Unit> {
        self.get_mut(guid).and_then(Entity::as_unit_mut)
    }

    /// Whether `guid` names a unit that exists and is not dead.
    pub fn is_live_unit(&self, guid: Guid) -> bool {
        self.unit(guid).map(|u| !u.is_dead).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Guids of all units, in ascending order.
    pub fn unit_ids(&self) -> Vec<Guid> {
        let mut ids: Vec<Guid> = self
            .entities
            .values()
            .filter(|e| e.as_unit().is_some())
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_unique_guids() {
        let mut table = EntityTable::new();
        let a = table.insert(Entity::doodad("Tree", "tree", true));
        let b = table.insert(Entity::doodad("Rock", "rock", true));
        assert_ne!(a, b);
        assert_eq!(table.get(a).map(|e| e.id), Some(a));
        assert_eq!(table.len(), 2);

        table.remove(a);
        let c = table.insert(Entity::doodad("Bush", "bush", false));
        assert_ne!(c, a);
    }

    #[test]
    fn test_object_type_follows_body() {
        let mut hero = Unit::new(1, UnitStats::default());
        hero.hero = Some(HeroData::default());

        assert_eq!(
            Entity::unit("Hero", "hero", hero).object_type(),
            ObjectType::Hero
        );
        assert_eq!(
            Entity::unit("Wolf", "wolf", Unit::new(1, UnitStats::default())).object_type(),
            ObjectType::Unit
        );
        assert_eq!(
            Entity::doodad("Tree", "tree", true).object_type(),
            ObjectType::Doodad
        );
        assert_eq!(
            Entity::effect("Flash", "flash", Some(100)).object_type(),
            ObjectType::Effect
        );
    }

    #[test]
    fn test_scale_is_clamped() {
        let entity = Entity::doodad("Pebble", "rock", false).scaled(0.0);
        assert_eq!(entity.scale(), MIN_SCALE);
        let entity = Entity::doodad("Mountain", "rock", true).scaled(1000.0);
        assert_eq!(entity.scale(), MAX_SCALE);
    }

    #[test]
    fn test_live_unit_lookup() {
        let mut table = EntityTable::new();
        let unit = table.insert(Entity::unit("Wolf", "wolf", Unit::new(1, UnitStats::default())));
        let tree = table.insert(Entity::doodad("Tree", "tree", true));

        assert!(table.is_live_unit(unit));
        assert!(!table.is_live_unit(tree));
        assert!(!table.is_live_unit(999));

        table.unit_mut(unit).unwrap().is_dead = true;
        assert!(!table.is_live_unit(unit));
        assert_eq!(table.unit_ids(), vec![unit]);
    }

    #[test]
    fn test_ability_cooldown_ticks_down() {
        let mut ability = Ability::attack(1, 1.0, 10.0, 1000);
        ability.current_cooldown_ms = 300;
        assert!(!ability.is_ready());
        ability.tick(200);
        assert_eq!(ability.current_cooldown_ms, 100);
        ability.tick(500);
        assert!(ability.is_ready());
    }
}
