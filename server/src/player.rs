//! Players and the relations between them.
//!
//! Two neutral players always exist in a simulation, one aggressive and one
//! friendly. Their ids come from [`NeutralPlayers`], which is part of the
//! simulation's configuration, so independent simulations never share them.

use crate::visibility::VisibilityTracker;
use log::info;
use shared::{Guid, PlayerId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Human,
    NeutralAggressive,
    NeutralFriendly,
}

/// Ids of the two neutral players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeutralPlayers {
    pub aggressive: PlayerId,
    pub friendly: PlayerId,
}

impl Default for NeutralPlayers {
    fn default() -> Self {
        Self {
            aggressive: 1,
            friendly: 2,
        }
    }
}

#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub kind: PlayerKind,
    pub visibility: VisibilityTracker,
    main_hero: Option<Guid>,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, kind: PlayerKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            visibility: VisibilityTracker::new(),
            main_hero: None,
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind == PlayerKind::Human
    }

    pub fn is_neutral_aggressive(&self) -> bool {
        self.kind == PlayerKind::NeutralAggressive
    }

    pub fn is_neutral_friendly(&self) -> bool {
        self.kind == PlayerKind::NeutralFriendly
    }

    pub fn main_hero(&self) -> Option<Guid> {
        self.main_hero
    }

    /// Records `hero` as this player's hero. Fails if a different hero is
    /// already set.
    pub(crate) fn try_set_main_hero(&mut self, hero: Guid) -> bool {
        match self.main_hero {
            Some(current) => current == hero,
            None => {
                self.main_hero = Some(hero);
                true
            }
        }
    }

    pub(crate) fn clear_main_hero(&mut self, hero: Guid) {
        if self.main_hero == Some(hero) {
            self.main_hero = None;
        }
    }

    /// Enmity depends only on the two players' kinds, so it is symmetric.
    pub fn is_enemy_of(&self, other: &Player) -> bool {
        if self.id == other.id {
            return false;
        }

        let one_is_human = self.is_human() || other.is_human();
        let both_human = self.is_human() && other.is_human();
        let one_is_friendly = self.is_neutral_friendly() || other.is_neutral_friendly();
        let one_is_aggressive = self.is_neutral_aggressive() || other.is_neutral_aggressive();
        let both_aggressive = self.is_neutral_aggressive() && other.is_neutral_aggressive();

        (one_is_human && one_is_aggressive)
            || both_aggressive
            || (one_is_aggressive && one_is_friendly)
            || both_human
    }
}

#[derive(Debug)]
pub struct PlayerTable {
    players: HashMap<PlayerId, Player>,
    neutral: NeutralPlayers,
    next_id: PlayerId,
}

impl PlayerTable {
    pub fn new(neutral: NeutralPlayers) -> Self {
        let mut players = HashMap::new();
        players.insert(
            neutral.aggressive,
            Player::new(neutral.aggressive, "Aggressive", PlayerKind::NeutralAggressive),
        );
        players.insert(
            neutral.friendly,
            Player::new(neutral.friendly, "Friendly", PlayerKind::NeutralFriendly),
        );

        Self {
            players,
            neutral,
            next_id: neutral.aggressive.max(neutral.friendly) + 1,
        }
    }

    pub fn neutral(&self) -> NeutralPlayers {
        self.neutral
    }

    pub fn add_human(&mut self, name: &str) -> PlayerId {
        let id = self.next_id;
        self.next_id += 1;
        self.players
            .insert(id, Player::new(id, name, PlayerKind::Human));
        info!("Player {} ({}) joined", id, name);
        id
    }

    /// Removes a human player. Neutral players cannot be removed.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        if id == self.neutral.aggressive || id == self.neutral.friendly {
            return None;
        }
        let player = self.players.remove(&id)?;
        info!("Player {} ({}) left", player.id, player.name);
        Some(player)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// Unknown players are nobody's enemy.
    pub fn are_enemies(&self, a: PlayerId, b: PlayerId) -> bool {
        match (self.players.get(&a), self.players.get(&b)) {
            (Some(pa), Some(pb)) => pa.is_enemy_of(pb),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_humans() -> (PlayerTable, PlayerId, PlayerId) {
        let mut table = PlayerTable::new(NeutralPlayers::default());
        let a = table.add_human("alice");
        let b = table.add_human("bob");
        (table, a, b)
    }

    #[test]
    fn test_neutral_players_always_exist() {
        let table = PlayerTable::new(NeutralPlayers {
            aggressive: 10,
            friendly: 20,
        });
        assert_eq!(table.len(), 2);
        assert!(table.get(10).unwrap().is_neutral_aggressive());
        assert!(table.get(20).unwrap().is_neutral_friendly());
    }

    #[test]
    fn test_human_ids_do_not_collide_with_neutrals() {
        let mut table = PlayerTable::new(NeutralPlayers {
            aggressive: 10,
            friendly: 20,
        });
        let id = table.add_human("carol");
        assert_eq!(id, 21);
    }

    #[test]
    fn test_enemy_matrix() {
        let (table, a, b) = table_with_humans();
        let n = table.neutral();

        assert!(table.are_enemies(a, b));
        assert!(table.are_enemies(a, n.aggressive));
        assert!(table.are_enemies(n.aggressive, n.friendly));
        assert!(!table.are_enemies(a, n.friendly));
        assert!(!table.are_enemies(a, a));
        assert!(!table.are_enemies(n.friendly, n.friendly));
        assert!(!table.are_enemies(n.aggressive, n.aggressive));
    }

    #[test]
    fn test_enmity_is_symmetric() {
        let (table, a, b) = table_with_humans();
        let n = table.neutral();
        let ids = [a, b, n.aggressive, n.friendly];
        for x in ids {
            for y in ids {
                assert_eq!(table.are_enemies(x, y), table.are_enemies(y, x));
            }
        }
    }

    #[test]
    fn test_neutral_players_cannot_be_removed() {
        let (mut table, a, _) = table_with_humans();
        let n = table.neutral();
        assert!(table.remove(n.aggressive).is_none());
        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert!(!table.are_enemies(a, n.aggressive));
    }

    #[test]
    fn test_main_hero_is_set_once() {
        let mut player = Player::new(5, "dave", PlayerKind::Human);
        assert!(player.try_set_main_hero(3));
        assert!(player.try_set_main_hero(3));
        assert!(!player.try_set_main_hero(4));
        assert_eq!(player.main_hero(), Some(3));

        player.clear_main_hero(3);
        assert_eq!(player.main_hero(), None);
    }
}
