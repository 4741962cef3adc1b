//! Per-unit order arbitration.
//!
//! A unit has at most one current order, set by commands, and a default
//! order it falls back to when the current one is missing or unwilling.
//! Once per tick [`OrderArbiter::tick`] decides which of the two drives the
//! unit.

use crate::aggro::Aggro;
use crate::orders::{
    MoveAttack, MoveDirection, MoveToGround, MoveToUnit, Order, OrderContext, OrderList,
    SpamCast, UnitAction,
};
use log::debug;
use shared::{Guid, OrderKind, Vector2};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("order {0} is not implemented")]
    NotImplemented(&'static str),
    #[error("target is not an enemy")]
    NotAnEnemy,
    #[error("no such unit")]
    UnknownUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbiterState {
    /// Only the default order is running.
    #[default]
    Idle,
    Executing(OrderKind),
}

#[derive(Debug, Default)]
pub struct OrderArbiter {
    current: Option<Order>,
    default: Option<Order>,
    state: ArbiterState,
}

impl OrderArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current order. Nothing of the previous order survives.
    pub fn set_order(&mut self, order: Order) {
        self.current = Some(order);
    }

    pub fn clear_order(&mut self) {
        self.current = None;
    }

    pub fn set_default_order(&mut self, order: Order) {
        self.default = Some(order);
    }

    pub fn current_order(&self) -> Option<&Order> {
        self.current.as_ref()
    }

    pub fn current_order_mut(&mut self) -> Option<&mut Order> {
        self.current.as_mut()
    }

    pub fn default_order(&self) -> Option<&Order> {
        self.default.as_ref()
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// The order shown to observers: the current one, else the default.
    pub fn displayed_kind(&self) -> OrderKind {
        self.current
            .as_ref()
            .or(self.default.as_ref())
            .map(Order::kind)
            .unwrap_or_default()
    }

    /// Calls `f` on every aggro tracker in both the current and default
    /// orders.
    pub fn visit_aggro(&mut self, f: &mut dyn FnMut(&mut Aggro)) {
        if let Some(order) = self.current.as_mut() {
            order.visit_aggro(f);
        }
        if let Some(order) = self.default.as_mut() {
            order.visit_aggro(f);
        }
    }

    /// Runs one tick of arbitration and returns what the unit does.
    pub fn tick(&mut self, ctx: &OrderContext) -> UnitAction {
        if let Some(order) = self.current.as_mut() {
            if order.take_control(ctx) {
                let kind = order.kind();
                let step = order.update(ctx);
                if !step.keep_control {
                    debug!("Unit {} finished order {:?}", ctx.unit_id, kind);
                    self.current = None;
                }
                self.state = ArbiterState::Executing(kind);
                return step.action;
            }
            debug!(
                "Unit {} dropped order {:?}",
                ctx.unit_id,
                order.kind()
            );
            self.current = None;
        }

        self.state = ArbiterState::Idle;
        if let Some(order) = self.default.as_mut() {
            if order.take_control(ctx) {
                return order.update(ctx).action;
            }
        }
        UnitAction::Stand
    }

    pub fn order_move_to(&mut self, point: Vector2) {
        self.set_order(Order::MoveToGround(MoveToGround::new(point)));
    }

    pub fn order_move_direction(&mut self, angle: f32) {
        self.set_order(Order::MoveDirection(MoveDirection {
            direction: Some(angle),
        }));
    }

    pub fn order_move_to_unit(&mut self, target: Guid, distance_threshold: f32) {
        self.set_order(Order::MoveToUnit(MoveToUnit::new(
            target,
            distance_threshold,
            false,
        )));
    }

    pub fn order_move_attack(&mut self, point: Vector2) {
        self.set_order(Order::MoveAttack(MoveAttack::new(point)));
    }

    /// Attacks `target` until it dies: casts when in range, chases it
    /// otherwise.
    pub fn order_attack(&mut self, target: Guid, follow_distance: f32) {
        self.set_order(Order::OrderList(OrderList::new(vec![
            Order::SpamCast(SpamCast::new(target)),
            Order::MoveToUnit(MoveToUnit::new(target, follow_distance, true)),
        ])));
    }

    pub fn order_follow(&mut self, _target: Guid) -> Result<(), OrderError> {
        Err(OrderError::NotImplemented("follow"))
    }

    pub fn order_patrol(&mut self, _waypoints: &[Vector2]) -> Result<(), OrderError> {
        Err(OrderError::NotImplemented("patrol"))
    }
}
