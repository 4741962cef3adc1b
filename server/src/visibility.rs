//! Who sees what.
//!
//! [`SightIndex`] is the world-level record of sight: for every observing
//! unit the set of entities it sees, and the reverse index from each entity
//! to the units sighting it. The reverse index never owns anything; it only
//! holds guids.
//!
//! [`VisibilityTracker`] belongs to a player. Its visible set is derived from
//! the sight of the player's controlled units and is recomputed on every
//! change; it emits [`VisibilityEvent`]s only when an entity actually enters
//! or leaves the set.

use shared::Guid;
use std::collections::{HashMap, HashSet};

/// Sight changes of a single observer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SightDiff {
    pub gained: Vec<Guid>,
    pub lost: Vec<Guid>,
}

impl SightDiff {
    pub fn is_empty(&self) -> bool {
        self.gained.is_empty() && self.lost.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SightIndex {
    sees: HashMap<Guid, HashSet<Guid>>,
    seen_by: HashMap<Guid, HashSet<Guid>>,
}

impl SightIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything `observer` sees and returns what changed.
    pub fn set_sight(&mut self, observer: Guid, seen: HashSet<Guid>) -> SightDiff {
        let previous = self.sees.remove(&observer).unwrap_or_default();

        let mut diff = SightDiff::default();
        for &e in seen.difference(&previous) {
            self.seen_by.entry(e).or_default().insert(observer);
            diff.gained.push(e);
        }
        for &e in previous.difference(&seen) {
            self.unlink(observer, e);
            diff.lost.push(e);
        }
        diff.gained.sort_unstable();
        diff.lost.sort_unstable();

        if !seen.is_empty() {
            self.sees.insert(observer, seen);
        }
        diff
    }

    /// Drops `entity` both as an observer and as a sighted entity. Returns
    /// the observers that were sighting it.
    pub fn remove_entity(&mut self, entity: Guid) -> Vec<Guid> {
        if let Some(seen) = self.sees.remove(&entity) {
            for e in seen {
                self.unlink(entity, e);
            }
        }

        let mut observers: Vec<Guid> = self
            .seen_by
            .remove(&entity)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for observer in &observers {
            if let Some(set) = self.sees.get_mut(observer) {
                set.remove(&entity);
            }
        }
        observers.sort_unstable();
        observers
    }

    fn unlink(&mut self, observer: Guid, entity: Guid) {
        if let Some(observers) = self.seen_by.get_mut(&entity) {
            observers.remove(&observer);
            if observers.is_empty() {
                self.seen_by.remove(&entity);
            }
        }
    }

    /// Entities sighted by `observer`.
    pub fn seen_by(&self, observer: Guid) -> impl Iterator<Item = Guid> + '_ {
        self.sees.get(&observer).into_iter().flatten().copied()
    }

    /// Units currently sighting `entity`.
    pub fn observers_of(&self, entity: Guid) -> impl Iterator<Item = Guid> + '_ {
        self.seen_by.get(&entity).into_iter().flatten().copied()
    }

    pub fn sees(&self, observer: Guid, entity: Guid) -> bool {
        self.sees
            .get(&observer)
            .map(|s| s.contains(&entity))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    Seen(Guid),
    Unseen(Guid),
}

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    controlled: HashSet<Guid>,
    visible: HashSet<Guid>,
    events: Vec<VisibilityEvent>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts deriving visibility from `unit`. Everything it already sees
    /// becomes visible at once. Returns false if it was already controlled.
    pub fn add_controlled_unit(&mut self, unit: Guid, sight: &SightIndex) -> bool {
        if !self.controlled.insert(unit) {
            return false;
        }
        for e in sight.seen_by(unit) {
            if self.visible.insert(e) {
                self.events.push(VisibilityEvent::Seen(e));
            }
        }
        true
    }

    /// Stops deriving visibility from `unit`. Entities it saw stay visible
    /// only while another controlled unit still sights them. Returns false
    /// if the unit was not controlled.
    pub fn remove_controlled_unit(&mut self, unit: Guid, sight: &SightIndex) -> bool {
        if !self.controlled.remove(&unit) {
            return false;
        }
        let candidates: Vec<Guid> = sight.seen_by(unit).collect();
        for e in candidates {
            if self.should_unsee(e, sight) && self.visible.remove(&e) {
                self.events.push(VisibilityEvent::Unseen(e));
            }
        }
        true
    }

    fn should_unsee(&self, entity: Guid, sight: &SightIndex) -> bool {
        !sight
            .observers_of(entity)
            .any(|observer| self.controlled.contains(&observer))
    }

    /// Recomputes the visible set from scratch and diffs it against the
    /// previous one. Returns the number of events raised.
    pub fn refresh(&mut self, sight: &SightIndex) -> usize {
        let mut now_visible = HashSet::with_capacity(self.visible.len());
        for &unit in &self.controlled {
            now_visible.extend(sight.seen_by(unit));
        }

        let before = self.events.len();
        let mut seen: Vec<Guid> = now_visible.difference(&self.visible).copied().collect();
        let mut unseen: Vec<Guid> = self.visible.difference(&now_visible).copied().collect();
        seen.sort_unstable();
        unseen.sort_unstable();
        self.events
            .extend(unseen.into_iter().map(VisibilityEvent::Unseen));
        self.events.extend(seen.into_iter().map(VisibilityEvent::Seen));

        self.visible = now_visible;
        self.events.len() - before
    }

    pub fn controlled_units(&self) -> &HashSet<Guid> {
        &self.controlled
    }

    pub fn controls(&self, unit: Guid) -> bool {
        self.controlled.contains(&unit)
    }

    pub fn visible(&self) -> &HashSet<Guid> {
        &self.visible
    }

    pub fn is_visible(&self, entity: Guid) -> bool {
        self.visible.contains(&entity)
    }

    pub fn drain_events(&mut self) -> Vec<VisibilityEvent> {
        std::mem::take(&mut self.events)
    }
}
