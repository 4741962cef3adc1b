//! Orders: what a unit is trying to do right now.
//!
//! Every order answers two questions each tick. [`Order::take_control`] says
//! whether it is willing to drive the unit given the current world, and
//! [`Order::update`] produces the [`UnitAction`] for this tick along with
//! whether the order wants to keep control afterwards. Orders only read the
//! world; the simulation applies the returned action.

use crate::aggro::Aggro;
use crate::entity::{Entity, EntityTable, Unit};
use shared::{Guid, OrderKind, Vector2};

/// Read-only view of a unit and its world for one order tick.
pub struct OrderContext<'a> {
    pub unit_id: Guid,
    pub position: Vector2,
    pub scale: f32,
    pub unit: &'a Unit,
    pub world: &'a EntityTable,
    pub ms_elapsed: u32,
}

impl<'a> OrderContext<'a> {
    /// Returns `None` if `entity` is not a unit.
    pub fn new(entity: &'a Entity, world: &'a EntityTable, ms_elapsed: u32) -> Option<Self> {
        Some(Self {
            unit_id: entity.id,
            position: entity.position,
            scale: entity.scale(),
            unit: entity.as_unit()?,
            world,
            ms_elapsed,
        })
    }

    /// Distance the unit may travel this tick.
    pub fn step_distance(&self) -> f32 {
        self.unit.stats.move_speed * self.ms_elapsed as f32 / 1000.0
    }

    /// The entity behind `guid`, if it is a unit that is still alive.
    pub fn live_unit(&self, guid: Guid) -> Option<&'a Entity> {
        self.world.get(guid).filter(|e| e.as_unit().map(|u| !u.is_dead).unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CastTarget {
    None,
    Unit(Guid),
    Point(Vector2),
}

/// What a unit does during a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitAction {
    Stand,
    Move { direction: f32, distance: f32 },
    Cast { ability_id: u32, target: CastTarget },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub keep_control: bool,
    pub action: UnitAction,
}

impl Step {
    pub fn proceed(action: UnitAction) -> Self {
        Self {
            keep_control: true,
            action,
        }
    }

    pub fn release(action: UnitAction) -> Self {
        Self {
            keep_control: false,
            action,
        }
    }
}

/// Moves in a fixed direction, or along the owner's input if no direction
/// is given. Never gives up control.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoveDirection {
    pub direction: Option<f32>,
}

impl MoveDirection {
    pub fn update(&self, ctx: &OrderContext) -> Step {
        let direction = match self.direction {
            Some(angle) => angle,
            None if ctx.unit.input_movement.is_moving => ctx.unit.input_movement.direction,
            None => return Step::proceed(UnitAction::Stand),
        };
        Step::proceed(UnitAction::Move {
            direction,
            distance: ctx.step_distance(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveToGround {
    pub target: Vector2,
    pub distance_threshold: f32,
}

impl MoveToGround {
    pub const DEFAULT_THRESHOLD: f32 = 0.05;

    pub fn new(target: Vector2) -> Self {
        Self {
            target,
            distance_threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    pub fn take_control(&self, ctx: &OrderContext) -> bool {
        ctx.position.distance_to(self.target) > self.distance_threshold
    }

    pub fn update(&self, ctx: &OrderContext) -> Step {
        let dist = ctx.position.distance_to(self.target);
        if dist <= self.distance_threshold {
            return Step::release(UnitAction::Stand);
        }

        let distance = ctx.step_distance().min(dist);
        Step {
            keep_control: dist - distance > self.distance_threshold,
            action: UnitAction::Move {
                direction: ctx.position.angle_to(self.target),
                distance,
            },
        }
    }
}

/// Walks up to a unit. A following order keeps control while in range;
/// otherwise it releases once the target is reached.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoveToUnit {
    pub target: Option<Guid>,
    pub distance_threshold: f32,
    pub keep_following: bool,
}

impl MoveToUnit {
    pub fn new(target: Guid, distance_threshold: f32, keep_following: bool) -> Self {
        Self {
            target: Some(target),
            distance_threshold,
            keep_following,
        }
    }

    fn target_distance(&self, ctx: &OrderContext) -> Option<(f32, Vector2)> {
        let target = ctx.live_unit(self.target?)?;
        Some((ctx.position.distance_to(target.position), target.position))
    }

    pub fn take_control(&self, ctx: &OrderContext) -> bool {
        match self.target_distance(ctx) {
            Some((dist, _)) => self.keep_following || dist > self.distance_threshold,
            None => false,
        }
    }

    pub fn update(&self, ctx: &OrderContext) -> Step {
        let Some((dist, target_pos)) = self.target_distance(ctx) else {
            return Step::release(UnitAction::Stand);
        };
        if dist <= self.distance_threshold {
            return Step {
                keep_control: self.keep_following,
                action: UnitAction::Stand,
            };
        }

        Step::proceed(UnitAction::Move {
            direction: ctx.position.angle_to(target_pos),
            distance: ctx.step_distance().min(dist - self.distance_threshold),
        })
    }
}

/// Casts the unit's spammable abilities at a target whenever they are
/// ready. Holds control while the target is alive and in range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpamCast {
    pub target: Option<Guid>,
}

impl SpamCast {
    pub fn new(target: Guid) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Distance to the target minus cast range, or `None` without a target.
    fn range_margin(&self, ctx: &OrderContext) -> Option<f32> {
        let target = ctx.live_unit(self.target?)?;
        let range = ctx
            .unit
            .abilities
            .iter()
            .filter(|a| a.spammable)
            .map(|a| a.cast_range)
            .fold(None, |acc: Option<f32>, r| Some(acc.map_or(r, |m| m.max(r))))?;
        let reach = range + (ctx.scale + target.scale()) / 2.0;
        Some(ctx.position.distance_to(target.position) - reach)
    }

    pub fn take_control(&self, ctx: &OrderContext) -> bool {
        matches!(self.range_margin(ctx), Some(margin) if margin <= 0.0)
    }

    pub fn update(&self, ctx: &OrderContext) -> Step {
        let Some(target) = self.target.and_then(|t| ctx.live_unit(t)) else {
            return Step::release(UnitAction::Stand);
        };
        let dist = ctx.position.distance_to(target.position);
        let radii = (ctx.scale + target.scale()) / 2.0;

        let ability = ctx.unit.abilities.iter().find(|a| {
            a.spammable
                && a.is_ready()
                && a.mana_cost <= ctx.unit.mana
                && dist <= a.cast_range + radii
        });
        match ability {
            Some(a) => Step::proceed(UnitAction::Cast {
                ability_id: a.id,
                target: CastTarget::Unit(target.id),
            }),
            None => Step::proceed(UnitAction::Stand),
        }
    }
}

/// Children in priority order; the first one willing to take control
/// drives the unit for the tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderList {
    pub orders: Vec<Order>,
    active: Option<usize>,
}

impl OrderList {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders,
            active: None,
        }
    }

    /// Index of the child that drove the unit last tick.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Picks the child that drives this tick's [`OrderList::update`].
    pub fn take_control(&mut self, ctx: &OrderContext) -> bool {
        self.active = self.orders.iter_mut().position(|o| o.take_control(ctx));
        self.active.is_some()
    }

    pub fn update(&mut self, ctx: &OrderContext) -> Step {
        match self.active.and_then(|i| self.orders.get_mut(i)) {
            Some(order) => Step::proceed(order.update(ctx).action),
            None => Step::release(UnitAction::Stand),
        }
    }
}

/// Fights whatever the unit has aggro on; walks to the destination when
/// there is nothing to fight.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAttack {
    pub aggro: Aggro,
    pub destination: MoveToGround,
    fighting: bool,
}

impl MoveAttack {
    pub fn new(destination: Vector2) -> Self {
        Self {
            aggro: Aggro::new(),
            destination: MoveToGround::new(destination),
            fighting: false,
        }
    }

    /// Whether the last tick went to fighting rather than walking.
    pub fn is_fighting(&self) -> bool {
        self.fighting
    }

    pub fn take_control(&mut self, ctx: &OrderContext) -> bool {
        // aggro must retarget every tick, so it is polled first
        self.fighting = self.aggro.take_control(ctx);
        self.fighting || self.destination.take_control(ctx)
    }

    pub fn update(&mut self, ctx: &OrderContext) -> Step {
        if self.fighting {
            return Step::proceed(self.aggro.update(ctx).action);
        }
        self.destination.update(ctx)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    MoveDirection(MoveDirection),
    MoveToGround(MoveToGround),
    MoveToUnit(MoveToUnit),
    MoveAttack(MoveAttack),
    SpamCast(SpamCast),
    OrderList(OrderList),
    Aggro(Aggro),
}

impl Order {
    pub fn kind(&self) -> OrderKind {
        match self {
            Order::MoveDirection(_) => OrderKind::MoveDirection,
            Order::MoveToGround(_) => OrderKind::MoveToGround,
            Order::MoveToUnit(_) => OrderKind::MoveToUnit,
            Order::MoveAttack(_) => OrderKind::MoveAttack,
            Order::SpamCast(_) => OrderKind::SpamCast,
            Order::OrderList(_) => OrderKind::OrderList,
            Order::Aggro(_) => OrderKind::Aggro,
        }
    }

    pub fn take_control(&mut self, ctx: &OrderContext) -> bool {
        match self {
            Order::MoveDirection(_) => true,
            Order::MoveToGround(o) => o.take_control(ctx),
            Order::MoveToUnit(o) => o.take_control(ctx),
            Order::MoveAttack(o) => o.take_control(ctx),
            Order::SpamCast(o) => o.take_control(ctx),
            Order::OrderList(o) => o.take_control(ctx),
            Order::Aggro(o) => o.take_control(ctx),
        }
    }

    pub fn update(&mut self, ctx: &OrderContext) -> Step {
        match self {
            Order::MoveDirection(o) => o.update(ctx),
            Order::MoveToGround(o) => o.update(ctx),
            Order::MoveToUnit(o) => o.update(ctx),
            Order::MoveAttack(o) => o.update(ctx),
            Order::SpamCast(o) => o.update(ctx),
            Order::OrderList(o) => o.update(ctx),
            Order::Aggro(o) => o.update(ctx),
        }
    }

    /// Calls `f` on every aggro tracker inside this order.
    pub fn visit_aggro(&mut self, f: &mut dyn FnMut(&mut Aggro)) {
        match self {
            Order::Aggro(a) => f(a),
            Order::MoveAttack(m) => f(&mut m.aggro),
            Order::OrderList(list) => {
                for order in &mut list.orders {
                    order.visit_aggro(f);
                }
            }
            _ => {}
        }
    }
}
