use crate::aggro::Aggro;
use crate::arbiter::{OrderArbiter, OrderError};
use crate::entity::{
    Ability, AbilityTargetType, Entity, EntityBody, EntityTable, HeroData, Unit, UnitStats,
};
use crate::orders::{CastTarget, MoveDirection, Order, OrderContext, UnitAction};
use crate::player::{NeutralPlayers, PlayerTable};
use crate::visibility::{SightIndex, VisibilityEvent};
use log::{debug, info, warn};
use shared::{Guid, MovementState, PlayerId, PlayerInput, Vector2};
use std::collections::HashSet;

/// Lifetime of the effect left where a point-target ability lands.
pub const IMPACT_EFFECT_MS: u32 = 500;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub neutral: NeutralPlayers,
    pub hero_spawn: Vector2,
    /// Heroes spawn on a ring of this radius around `hero_spawn`.
    pub hero_spawn_spread: f32,
    pub hero_stats: UnitStats,
    pub hero_abilities: Vec<Ability>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            neutral: NeutralPlayers::default(),
            hero_spawn: Vector2::new(32.0, 32.0),
            hero_spawn_spread: 2.0,
            hero_stats: UnitStats {
                max_life: 200.0,
                max_mana: 100.0,
                move_speed: 6.0,
                vision_range: 12.0,
                ..UnitStats::default()
            },
            hero_abilities: vec![Ability::attack(1, 1.5, 12.0, 800)],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnKind {
    Unit,
    Hero,
    Doodad { has_collision: bool },
    Effect { remaining_ms: Option<u32> },
}

/// An already validated request to place an entity on the map.
#[derive(Debug, Clone)]
pub struct SpawnDescriptor {
    pub kind: SpawnKind,
    pub name: String,
    pub model: String,
    pub owner: PlayerId,
    pub position: Vector2,
    pub scale: Option<f32>,
    pub stats: UnitStats,
    pub abilities: Vec<Ability>,
}

impl SpawnDescriptor {
    fn new(kind: SpawnKind, name: &str, model: &str, owner: PlayerId, position: Vector2) -> Self {
        Self {
            kind,
            name: name.to_string(),
            model: model.to_string(),
            owner,
            position,
            scale: None,
            stats: UnitStats::default(),
            abilities: Vec::new(),
        }
    }

    pub fn unit(name: &str, model: &str, owner: PlayerId, position: Vector2) -> Self {
        Self::new(SpawnKind::Unit, name, model, owner, position)
    }

    pub fn hero(name: &str, model: &str, owner: PlayerId, position: Vector2) -> Self {
        Self::new(SpawnKind::Hero, name, model, owner, position)
    }

    pub fn doodad(name: &str, model: &str, position: Vector2, has_collision: bool) -> Self {
        Self::new(SpawnKind::Doodad { has_collision }, name, model, 0, position)
    }

    pub fn effect(name: &str, model: &str, position: Vector2, remaining_ms: Option<u32>) -> Self {
        Self::new(SpawnKind::Effect { remaining_ms }, name, model, 0, position)
    }

    pub fn with_stats(mut self, stats: UnitStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.abilities.push(ability);
        self
    }

    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// The authoritative world: entities, players and who sees what.
#[derive(Debug)]
pub struct GameState {
    pub tick: u32,
    config: SimulationConfig,
    entities: EntityTable,
    players: PlayerTable,
    sight: SightIndex,
}

impl GameState {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            tick: 0,
            players: PlayerTable::new(config.neutral),
            config,
            entities: EntityTable::new(),
            sight: SightIndex::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn players(&self) -> &PlayerTable {
        &self.players
    }

    pub fn sight(&self) -> &SightIndex {
        &self.sight
    }

    pub fn neutral(&self) -> NeutralPlayers {
        self.players.neutral()
    }

    pub fn add_human_player(&mut self, name: &str) -> PlayerId {
        self.players.add_human(name)
    }

    /// Despawns every unit the player owns, then removes the player.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        if !self.players.get(player).map(|p| p.is_human()).unwrap_or(false) {
            return false;
        }
        let owned: Vec<Guid> = self
            .entities
            .unit_ids()
            .into_iter()
            .filter(|&id| self.owner_of(id) == Some(player))
            .collect();
        for id in owned {
            self.destroy(id);
        }
        self.players.remove(player).is_some()
    }

    pub fn owner_of(&self, unit: Guid) -> Option<PlayerId> {
        self.entities.unit(unit).map(|u| u.owner)
    }

    pub fn are_enemy_units(&self, a: Guid, b: Guid) -> bool {
        match (self.owner_of(a), self.owner_of(b)) {
            (Some(pa), Some(pb)) => self.players.are_enemies(pa, pb),
            _ => false,
        }
    }

    /// Places an entity on the map. Units need an existing owner.
    pub fn spawn(&mut self, desc: SpawnDescriptor) -> Option<Guid> {
        let entity = match desc.kind {
            SpawnKind::Unit | SpawnKind::Hero => {
                if !self.players.contains(desc.owner) {
                    warn!("Cannot spawn {}: unknown owner {}", desc.name, desc.owner);
                    return None;
                }
                let mut unit = Unit::new(desc.owner, desc.stats);
                unit.abilities = desc.abilities;
                if desc.kind == SpawnKind::Hero {
                    unit.hero = Some(HeroData::default());
                } else {
                    unit.arbiter.set_default_order(Order::Aggro(Aggro::new()));
                }
                Entity::unit(&desc.name, &desc.model, unit)
            }
            SpawnKind::Doodad { has_collision } => {
                Entity::doodad(&desc.name, &desc.model, has_collision)
            }
            SpawnKind::Effect { remaining_ms } => {
                Entity::effect(&desc.name, &desc.model, remaining_ms)
            }
        };
        let entity = match desc.scale {
            Some(scale) => entity.at(desc.position).scaled(scale),
            None => entity.at(desc.position),
        };
        let is_unit = entity.as_unit().is_some();
        let guid = self.entities.insert(entity);
        debug!("Spawned {} {} at {:?}", desc.name, guid, desc.position);

        if is_unit {
            self.update_sight(guid);
            if let Some(player) = self.players.get_mut(desc.owner) {
                player.visibility.add_controlled_unit(guid, &self.sight);
            }
        }
        Some(guid)
    }

    /// Spawns a hero for `player` near the configured spawn point and makes
    /// it the player's main hero.
    pub fn spawn_hero(&mut self, player: PlayerId) -> Option<Guid> {
        let name = self.players.get(player)?.name.clone();
        let angle = player as f32 * 1.3;
        let position = self
            .config
            .hero_spawn
            .polar_projection(angle, self.config.hero_spawn_spread);

        let mut desc = SpawnDescriptor::hero(&name, "hero", player, position)
            .with_stats(self.config.hero_stats.clone());
        desc.abilities = self.config.hero_abilities.clone();

        let hero = self.spawn(desc)?;
        if !self.try_set_main_hero(player, hero) {
            self.destroy(hero);
            return None;
        }
        info!("Player {} spawned hero {}", player, hero);
        Some(hero)
    }

    /// Makes `hero` the player's main hero and hands its movement to the
    /// player's input.
    pub fn try_set_main_hero(&mut self, player: PlayerId, hero: Guid) -> bool {
        match self.entities.unit(hero) {
            Some(unit) if unit.is_hero() && unit.owner == player => {}
            _ => return false,
        }
        let accepted = self
            .players
            .get_mut(player)
            .map(|p| p.try_set_main_hero(hero))
            .unwrap_or(false);
        if accepted {
            if let Some(unit) = self.entities.unit_mut(hero) {
                unit.arbiter
                    .set_default_order(Order::MoveDirection(MoveDirection::default()));
            }
        }
        accepted
    }

    /// Removes an entity and every trace of it in sight and visibility.
    pub fn destroy(&mut self, guid: Guid) -> bool {
        let Some(owner) = self.entities.get(guid).map(|e| e.as_unit().map(|u| u.owner)) else {
            return false;
        };

        if let Some(player) = owner.and_then(|o| self.players.get_mut(o)) {
            player.visibility.remove_controlled_unit(guid, &self.sight);
            player.clear_main_hero(guid);
        }
        self.sight.remove_entity(guid);
        self.entities.remove(guid);
        for player in self.players.iter_mut() {
            player.visibility.refresh(&self.sight);
        }
        debug!("Destroyed entity {}", guid);
        true
    }

    pub fn visible_entities(&self, player: PlayerId) -> Option<&HashSet<Guid>> {
        self.players.get(player).map(|p| p.visibility.visible())
    }

    pub fn drain_visibility_events(&mut self, player: PlayerId) -> Vec<VisibilityEvent> {
        self.players
            .get_mut(player)
            .map(|p| p.visibility.drain_events())
            .unwrap_or_default()
    }

    /// Applies a player's input to their main hero. Input carrying
    /// non-finite numbers is ignored.
    pub fn apply_input(&mut self, player: PlayerId, input: &PlayerInput) {
        if !input.is_finite() {
            warn!("Ignoring non-finite input from player {}", player);
            return;
        }
        let Some(hero) = self.players.get(player).and_then(|p| p.main_hero()) else {
            return;
        };
        if let Some(unit) = self.entities.unit_mut(hero) {
            unit.input_movement = input.movement;
            if input.movement.is_moving {
                unit.arbiter.clear_order();
            }
        }
        self.try_cast_from_input(hero, input);
    }

    /// Casts the ability named by the input. Action id 0 means no cast.
    pub fn try_cast_from_input(&mut self, caster: Guid, input: &PlayerInput) -> bool {
        if input.action_id == 0 {
            return false;
        }
        let Some(target_type) = self
            .entities
            .unit(caster)
            .and_then(|u| u.ability(input.action_id))
            .map(|a| a.target_type)
        else {
            return false;
        };

        let unit_target = input
            .action_target_id
            .filter(|&id| self.entities.contains(id));
        let target = match target_type {
            AbilityTargetType::Passive => return false,
            AbilityTargetType::NoTarget => CastTarget::None,
            AbilityTargetType::PointTarget => match input.action_target_location {
                Some(point) => CastTarget::Point(point),
                None => return false,
            },
            AbilityTargetType::UnitTarget => match unit_target {
                Some(id) => CastTarget::Unit(id),
                None => return false,
            },
            AbilityTargetType::PointOrUnitTarget => {
                match (unit_target, input.action_target_location) {
                    (Some(id), _) => CastTarget::Unit(id),
                    (None, Some(point)) => CastTarget::Point(point),
                    (None, None) => return false,
                }
            }
        };
        self.cast(caster, input.action_id, target)
    }

    /// Casts an ability if it is ready, affordable and in range.
    pub fn cast(&mut self, caster: Guid, ability_id: u32, target: CastTarget) -> bool {
        let Some(entity) = self.entities.get(caster) else {
            return false;
        };
        let (origin, caster_scale) = (entity.position, entity.scale());
        let Some(ability) = entity.as_unit().and_then(|u| {
            u.ability(ability_id)
                .filter(|a| a.is_ready() && a.mana_cost <= u.mana && !u.is_dead)
                .cloned()
        }) else {
            return false;
        };

        let aim = match target {
            CastTarget::None => None,
            CastTarget::Point(point) if !point.is_finite() => return false,
            CastTarget::Point(point) => Some((point, 0.0)),
            CastTarget::Unit(id) => match self.entities.get(id) {
                Some(e) => Some((e.position, e.scale())),
                None => return false,
            },
        };
        if let Some((point, target_scale)) = aim {
            let reach = ability.cast_range + (caster_scale + target_scale) / 2.0;
            if origin.distance_to(point) > reach {
                return false;
            }
        }

        if let Some(entity) = self.entities.get_mut(caster) {
            if let Some((point, _)) = aim {
                entity.orientation = origin.angle_to(point);
            }
            entity.play_animation("attack", false);
            if let Some(unit) = entity.as_unit_mut() {
                unit.mana -= ability.mana_cost;
                unit.movement_state = MovementState::stand();
                if let Some(a) = unit.ability_mut(ability_id) {
                    a.current_cooldown_ms = a.cooldown_ms;
                }
            }
        }

        match target {
            CastTarget::Unit(id) if ability.damage > 0.0 => {
                self.deal_damage(caster, id, ability.damage);
            }
            CastTarget::Point(point) => {
                self.spawn(SpawnDescriptor::effect(
                    "Impact",
                    "impact",
                    point,
                    Some(IMPACT_EFFECT_MS),
                ));
            }
            _ => {}
        }
        true
    }

    /// Applies `amount` minus the target's defense and feeds the result to
    /// the target's aggro, whoever the source is. Returns the damage dealt.
    pub fn deal_damage(&mut self, source: Guid, target: Guid, amount: f32) -> f32 {
        let Some(entity) = self.entities.get_mut(target) else {
            return 0.0;
        };
        let Some(unit) = entity.as_unit_mut() else {
            return 0.0;
        };
        if unit.is_dead {
            return 0.0;
        }

        let final_damage = (amount - unit.stats.defense).max(0.0);
        unit.life -= final_damage;
        unit.arbiter
            .visit_aggro(&mut |aggro| aggro.on_damage_received(source, final_damage));
        let killed = unit.life <= 0.0;
        if killed {
            unit.life = 0.0;
            unit.is_dead = true;
        }

        if killed {
            entity.play_animation("death", false);
            info!("Unit {} was killed by {}", target, source);
        }
        final_damage
    }

    fn arbiter_mut(&mut self, unit: Guid) -> Result<&mut OrderArbiter, OrderError> {
        self.entities
            .unit_mut(unit)
            .map(|u| &mut u.arbiter)
            .ok_or(OrderError::UnknownUnit)
    }

    pub fn clear_order(&mut self, unit: Guid) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.clear_order();
        Ok(())
    }

    pub fn order_move_to(&mut self, unit: Guid, point: Vector2) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.order_move_to(point);
        Ok(())
    }

    pub fn order_move_direction(&mut self, unit: Guid, angle: f32) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.order_move_direction(angle);
        Ok(())
    }

    pub fn order_move_to_unit(&mut self, unit: Guid, target: Guid) -> Result<(), OrderError> {
        let threshold = self.follow_distance(unit, target)?;
        self.arbiter_mut(unit)?.order_move_to_unit(target, threshold);
        Ok(())
    }

    /// Walks to `point`, fighting every enemy currently in sight on the way.
    pub fn order_move_attack(&mut self, unit: Guid, point: Vector2) -> Result<(), OrderError> {
        let enemies = self.visible_enemies(unit);
        let arbiter = self.arbiter_mut(unit)?;
        arbiter.order_move_attack(point);
        if let Some(Order::MoveAttack(order)) = arbiter.current_order_mut() {
            order.aggro.reset_table(enemies);
        }
        Ok(())
    }

    pub fn order_attack(&mut self, unit: Guid, target: Guid) -> Result<(), OrderError> {
        if !self.entities.is_live_unit(target) {
            return Err(OrderError::UnknownUnit);
        }
        let follow = self.follow_distance(unit, target)?;
        if !self.are_enemy_units(unit, target) {
            return Err(OrderError::NotAnEnemy);
        }
        self.arbiter_mut(unit)?.order_attack(target, follow);
        Ok(())
    }

    pub fn order_follow(&mut self, unit: Guid, target: Guid) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.order_follow(target)
    }

    pub fn order_patrol(&mut self, unit: Guid, waypoints: &[Vector2]) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.order_patrol(waypoints)
    }

    fn follow_distance(&self, unit: Guid, target: Guid) -> Result<f32, OrderError> {
        match (self.entities.get(unit), self.entities.get(target)) {
            (Some(a), Some(b)) if a.as_unit().is_some() => Ok((a.scale() + b.scale()) / 2.0),
            _ => Err(OrderError::UnknownUnit),
        }
    }

    fn visible_enemies(&self, unit: Guid) -> Vec<Guid> {
        self.sight
            .seen_by(unit)
            .filter(|&e| e != unit && self.entities.is_live_unit(e) && self.are_enemy_units(unit, e))
            .collect()
    }

    /// Empties the aggro of every tracker the unit runs.
    pub fn clear_aggro(&mut self, unit: Guid) -> Result<(), OrderError> {
        self.arbiter_mut(unit)?.visit_aggro(&mut |aggro| aggro.clear_table());
        Ok(())
    }

    /// Restarts the unit's aggro from the enemies it currently sees.
    pub fn reset_aggro(&mut self, unit: Guid) -> Result<(), OrderError> {
        let enemies = self.visible_enemies(unit);
        self.arbiter_mut(unit)?
            .visit_aggro(&mut |aggro| aggro.reset_table(enemies.iter().copied()));
        Ok(())
    }

    /// Entities within `observer`'s vision range, itself included.
    fn compute_sight(&self, observer: Guid) -> HashSet<Guid> {
        let Some(entity) = self.entities.get(observer) else {
            return HashSet::new();
        };
        let Some(unit) = entity.as_unit() else {
            return HashSet::new();
        };
        let range = unit.stats.vision_range;
        let mut seen: HashSet<Guid> = self
            .entities
            .iter()
            .filter(|e| e.position.distance_to(entity.position) <= range)
            .map(|e| e.id)
            .collect();
        seen.insert(observer);
        seen
    }

    /// Recomputes what `observer` sees and seeds its aggro with newly seen
    /// enemies.
    fn update_sight(&mut self, observer: Guid) {
        let seen = self.compute_sight(observer);
        let diff = self.sight.set_sight(observer, seen);

        let enemies: Vec<Guid> = diff
            .gained
            .into_iter()
            .filter(|&e| e != observer && self.entities.is_live_unit(e) && self.are_enemy_units(observer, e))
            .collect();
        if enemies.is_empty() {
            return;
        }
        if let Some(unit) = self.entities.unit_mut(observer) {
            unit.arbiter.visit_aggro(&mut |aggro| {
                for &e in &enemies {
                    aggro.on_entity_seen(e);
                }
            });
        }
    }

    fn apply_action(&mut self, id: Guid, action: UnitAction) {
        match action {
            UnitAction::Stand => {
                if let Some(entity) = self.entities.get_mut(id) {
                    if let Some(unit) = entity.as_unit_mut() {
                        unit.movement_state = MovementState::stand();
                    }
                    entity.play_animation("stand", true);
                }
            }
            UnitAction::Move {
                direction,
                distance,
            } => {
                if let Some(entity) = self.entities.get_mut(id) {
                    entity.position = entity.position.polar_projection(direction, distance);
                    entity.orientation = direction;
                    entity.play_animation("walk", true);
                    if let Some(unit) = entity.as_unit_mut() {
                        unit.movement_state = MovementState::towards(direction);
                    }
                }
            }
            UnitAction::Cast { ability_id, target } => {
                self.cast(id, ability_id, target);
            }
        }
    }

    /// Advances the simulation by `ms_elapsed` milliseconds.
    pub fn update(&mut self, ms_elapsed: u32) {
        let mut expired = Vec::new();
        for entity in self.entities.iter_mut() {
            match &mut entity.body {
                EntityBody::Unit(unit) => {
                    for ability in &mut unit.abilities {
                        ability.tick(ms_elapsed);
                    }
                }
                EntityBody::Effect {
                    remaining_ms: Some(remaining),
                } => {
                    *remaining = remaining.saturating_sub(ms_elapsed);
                    if *remaining == 0 {
                        expired.push(entity.id);
                    }
                }
                _ => {}
            }
        }

        for id in self.entities.unit_ids() {
            if !self.entities.is_live_unit(id) {
                continue;
            }
            let Some(mut arbiter) = self
                .entities
                .unit_mut(id)
                .map(|u| std::mem::take(&mut u.arbiter))
            else {
                continue;
            };
            let action = match self
                .entities
                .get(id)
                .and_then(|e| OrderContext::new(e, &self.entities, ms_elapsed))
            {
                Some(ctx) => arbiter.tick(&ctx),
                None => UnitAction::Stand,
            };
            if let Some(unit) = self.entities.unit_mut(id) {
                unit.arbiter = arbiter;
            }
            self.apply_action(id, action);
        }

        let dead: Vec<Guid> = self
            .entities
            .iter()
            .filter(|e| e.is_dead())
            .map(|e| e.id)
            .collect();
        for id in dead.into_iter().chain(expired) {
            self.destroy(id);
        }

        for id in self.entities.unit_ids() {
            self.update_sight(id);
        }

        for player in self.players.iter_mut() {
            player.visibility.refresh(&self.sight);
            if !player.is_human() {
                player.visibility.drain_events();
            }
        }

        self.tick += 1;
        if self.tick % 300 == 0 {
            debug!(
                "Tick {}: {} entities, {} players",
                self.tick,
                self.entities.len(),
                self.players.len()
            );
        }
    }
}
