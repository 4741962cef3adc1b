//! Threat tracking for autonomous units.

use crate::entity::EntityTable;
use crate::orders::{MoveToUnit, OrderContext, SpamCast, Step, UnitAction};
use log::debug;
use shared::{Guid, Vector2};
use std::collections::HashMap;

/// Aggro scores keyed by enemy unit. Entries only disappear when their
/// unit dies or the table is cleared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggroTable {
    scores: HashMap<Guid, f32>,
}

impl AggroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `damage` to the score of `source`.
    pub fn on_damage_received(&mut self, source: Guid, damage: f32) {
        *self.scores.entry(source).or_insert(0.0) += damage.max(0.0);
    }

    /// Seeds a newly sighted enemy at zero. Existing scores are kept.
    pub fn on_entity_seen(&mut self, entity: Guid) -> bool {
        if self.scores.contains_key(&entity) {
            return false;
        }
        self.scores.insert(entity, 0.0);
        true
    }

    /// Drops dead or missing units, then picks the highest score. Ties go to
    /// the unit closer to `origin`, then to the lower guid.
    pub fn update_target(&mut self, origin: Vector2, world: &EntityTable) -> Option<Guid> {
        self.scores.retain(|&id, _| world.is_live_unit(id));

        let mut best: Option<(Guid, f32, f32)> = None;
        for (&id, &score) in &self.scores {
            let dist = match world.get(id) {
                Some(e) => origin.distance_to(e.position),
                None => continue,
            };
            let better = match best {
                None => true,
                Some((best_id, best_score, best_dist)) => {
                    score > best_score
                        || (score == best_score
                            && (dist < best_dist || (dist == best_dist && id < best_id)))
                }
            };
            if better {
                best = Some((id, score, dist));
            }
        }
        best.map(|(id, _, _)| id)
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }

    /// Clears the table and seeds every unit in `visible` at zero.
    pub fn reset(&mut self, visible: impl IntoIterator<Item = Guid>) {
        self.scores.clear();
        for id in visible {
            self.scores.insert(id, 0.0);
        }
    }

    pub fn score(&self, unit: Guid) -> Option<f32> {
        self.scores.get(&unit).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Attacks the unit with the most aggro: casts when in range and follows
/// it otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggro {
    table: AggroTable,
    target: Option<Guid>,
    spam: SpamCast,
    follow: MoveToUnit,
}

impl Aggro {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &AggroTable {
        &self.table
    }

    pub fn current_target(&self) -> Option<Guid> {
        self.target
    }

    pub fn on_damage_received(&mut self, source: Guid, damage: f32) {
        self.table.on_damage_received(source, damage);
    }

    pub fn on_entity_seen(&mut self, entity: Guid) {
        self.table.on_entity_seen(entity);
    }

    pub fn clear_table(&mut self) {
        self.table.clear();
    }

    pub fn reset_table(&mut self, visible_enemies: impl IntoIterator<Item = Guid>) {
        self.table.reset(visible_enemies);
    }

    fn update_target(&mut self, ctx: &OrderContext) {
        let next = self.table.update_target(ctx.position, ctx.world);
        if next == self.target {
            return;
        }
        debug!(
            "Unit {} switches target {:?} -> {:?}",
            ctx.unit_id, self.target, next
        );

        // both sub-orders move to the new target before either updates again
        let follow_distance = next
            .and_then(|t| ctx.world.get(t))
            .map(|e| (ctx.scale + e.scale()) / 2.0)
            .unwrap_or(0.0);
        self.target = next;
        self.spam = SpamCast { target: next };
        self.follow = MoveToUnit {
            target: next,
            distance_threshold: follow_distance,
            keep_following: false,
        };
    }

    pub fn take_control(&mut self, ctx: &OrderContext) -> bool {
        self.update_target(ctx);
        self.target.is_some() && (self.spam.take_control(ctx) || self.follow.take_control(ctx))
    }

    pub fn update(&mut self, ctx: &OrderContext) -> Step {
        if self.target.is_none() {
            return Step::release(UnitAction::Stand);
        }
        if self.spam.take_control(ctx) {
            return self.spam.update(ctx);
        }
        Step::proceed(self.follow.update(ctx).action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::tests::{ctx, spawn_unit};
    use crate::orders::CastTarget;

    #[test]
    fn test_damage_accumulates() {
        let mut table = AggroTable::new();
        table.on_damage_received(7, 4.0);
        table.on_damage_received(7, 6.0);
        assert_eq!(table.score(7), Some(10.0));
    }

    #[test]
    fn test_seen_never_overwrites_score() {
        let mut table = AggroTable::new();
        table.on_damage_received(7, 5.0);
        assert!(!table.on_entity_seen(7));
        assert!(table.on_entity_seen(8));
        assert_eq!(table.score(7), Some(5.0));
        assert_eq!(table.score(8), Some(0.0));
    }

    #[test]
    fn test_tie_goes_to_closer_enemy() {
        let mut world = EntityTable::new();
        let me = spawn_unit(&mut world, 1, Vector2::ZERO);
        let far = spawn_unit(&mut world, 3, Vector2::new(7.0, 0.0));
        let near = spawn_unit(&mut world, 3, Vector2::new(0.0, 4.0));

        let mut table = AggroTable::new();
        table.on_damage_received(far, 10.0);
        table.on_damage_received(near, 10.0);

        let origin = world.get(me).unwrap().position;
        assert_eq!(table.update_target(origin, &world), Some(near));
    }

    #[test]
    fn test_higher_score_beats_distance() {
        let mut world = EntityTable::new();
        let far = spawn_unit(&mut world, 3, Vector2::new(7.0, 0.0));
        let near = spawn_unit(&mut world, 3, Vector2::new(4.0, 0.0));

        let mut table = AggroTable::new();
        table.on_damage_received(far, 11.0);
        table.on_damage_received(near, 10.0);
        assert_eq!(table.update_target(Vector2::ZERO, &world), Some(far));
    }

    #[test]
    fn test_dead_targets_are_purged() {
        let mut world = EntityTable::new();
        let a = spawn_unit(&mut world, 3, Vector2::new(1.0, 0.0));
        let b = spawn_unit(&mut world, 3, Vector2::new(2.0, 0.0));

        let mut table = AggroTable::new();
        table.on_damage_received(a, 50.0);
        table.on_entity_seen(b);
        table.on_entity_seen(999);

        world.unit_mut(a).unwrap().is_dead = true;
        assert_eq!(table.update_target(Vector2::ZERO, &world), Some(b));
        assert_eq!(table.len(), 1);
        assert_eq!(table.score(a), None);
    }

    #[test]
    fn test_reset_reseeds_visible() {
        let mut table = AggroTable::new();
        table.on_damage_received(1, 30.0);
        table.reset([2, 3]);
        assert_eq!(table.score(1), None);
        assert_eq!(table.score(2), Some(0.0));
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_aggro_follows_then_casts() {
        let mut world = EntityTable::new();
        let me = spawn_unit(&mut world, 1, Vector2::ZERO);
        let enemy = spawn_unit(&mut world, 3, Vector2::new(5.0, 0.0));

        let mut aggro = Aggro::new();
        assert!(!aggro.take_control(&ctx(&world, me, 100)));

        aggro.on_entity_seen(enemy);
        assert!(aggro.take_control(&ctx(&world, me, 100)));
        assert_eq!(aggro.current_target(), Some(enemy));
        assert!(matches!(
            aggro.update(&ctx(&world, me, 100)).action,
            UnitAction::Move { .. }
        ));

        world.get_mut(enemy).unwrap().position = Vector2::new(1.5, 0.0);
        assert!(aggro.take_control(&ctx(&world, me, 100)));
        assert_eq!(
            aggro.update(&ctx(&world, me, 100)).action,
            UnitAction::Cast {
                ability_id: 1,
                target: CastTarget::Unit(enemy)
            }
        );
    }

    #[test]
    fn test_aggro_retargets_after_death() {
        let mut world = EntityTable::new();
        let me = spawn_unit(&mut world, 1, Vector2::ZERO);
        let first = spawn_unit(&mut world, 3, Vector2::new(3.0, 0.0));
        let second = spawn_unit(&mut world, 3, Vector2::new(-6.0, 0.0));

        let mut aggro = Aggro::new();
        aggro.on_damage_received(first, 20.0);
        aggro.on_damage_received(second, 5.0);
        aggro.take_control(&ctx(&world, me, 100));
        assert_eq!(aggro.current_target(), Some(first));

        world.unit_mut(first).unwrap().is_dead = true;
        assert!(aggro.take_control(&ctx(&world, me, 100)));
        assert_eq!(aggro.current_target(), Some(second));
        match aggro.update(&ctx(&world, me, 100)).action {
            UnitAction::Move { direction, .. } => {
                assert!((direction.abs() - std::f32::consts::PI).abs() < 1e-4)
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
