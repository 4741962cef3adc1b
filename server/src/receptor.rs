//! Server-side proxies of connected players
//!
//! A receptor is created when a client completes the handshake and lives
//! until the client disconnects or goes quiet for too long. It is the source
//! of the player's input frames and the sink of the per-tick state frames:
//! - Connection metadata (player id, address, last activity)
//! - The newest input frame received, with stale frames discarded
//! - The id of the next state frame sent to the client

use log::{debug, info};
use shared::codec::{frame_is_newer, MAX_FRAME_ID};
use shared::{PlayerId, PlayerInput};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a receptor may stay silent before it is dropped.
pub const RECEPTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected human player as seen by the server
#[derive(Debug)]
pub struct Receptor {
    /// Player this receptor feeds and observes for
    pub id: PlayerId,
    /// Network address for sending frames
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Id of the newest input frame accepted so far
    pub last_input_frame: Option<u32>,
    /// Input waiting to be applied on the next tick
    latest_input: Option<PlayerInput>,
    server_frame: u32,
}

impl Receptor {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_input_frame: None,
            latest_input: None,
            server_frame: 0,
        }
    }

    /// Marks the receptor as active.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Accepts an input frame if it is newer than the last accepted one.
    /// Older or repeated frames are discarded, so reordered packets never
    /// roll a player's input back.
    pub fn submit_input(&mut self, frame_id: u32, input: PlayerInput) -> bool {
        self.touch();
        if matches!(self.last_input_frame, Some(last) if !frame_is_newer(frame_id, last)) {
            debug!(
                "Receptor {} discarded stale input frame {} (have {:?})",
                self.id, frame_id, self.last_input_frame
            );
            return false;
        }
        self.last_input_frame = Some(frame_id);
        self.latest_input = Some(input);
        true
    }

    /// Takes the pending input, leaving nothing for the next tick.
    pub fn take_input(&mut self) -> Option<PlayerInput> {
        self.latest_input.take()
    }

    /// Id for the next state frame. Ids wrap inside the 24 bits the wire
    /// format allows.
    pub fn next_frame_id(&mut self) -> u32 {
        let id = self.server_frame;
        self.server_frame = if id >= MAX_FRAME_ID { 0 } else { id + 1 };
        id
    }

    /// Checks if the receptor has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All receptors of a server, keyed by player id
///
/// Enforces the server's capacity and maps incoming datagrams to their
/// receptor by source address.
#[derive(Debug)]
pub struct ReceptorManager {
    receptors: HashMap<PlayerId, Receptor>,
    max_receptors: usize,
}

impl ReceptorManager {
    pub fn new(max_receptors: usize) -> Self {
        Self {
            receptors: HashMap::new(),
            max_receptors,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.receptors.len() < self.max_receptors
    }

    /// Registers a receptor for an already created player
    ///
    /// Returns false if the server is full or the player already has one.
    pub fn add_receptor(&mut self, player: PlayerId, addr: SocketAddr) -> bool {
        if !self.has_capacity() || self.receptors.contains_key(&player) {
            return false;
        }
        info!("Receptor {} connected from {}", player, addr);
        self.receptors.insert(player, Receptor::new(player, addr));
        true
    }

    pub fn remove_receptor(&mut self, player: PlayerId) -> Option<Receptor> {
        let receptor = self.receptors.remove(&player)?;
        info!("Receptor {} disconnected", player);
        Some(receptor)
    }

    /// Finds the player connected from `addr`
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.receptors
            .values()
            .find(|r| r.addr == addr)
            .map(|r| r.id)
    }

    pub fn get(&self, player: PlayerId) -> Option<&Receptor> {
        self.receptors.get(&player)
    }

    pub fn get_mut(&mut self, player: PlayerId) -> Option<&mut Receptor> {
        self.receptors.get_mut(&player)
    }

    /// Forwards an input frame to the receptor; false if the player is
    /// unknown or the frame is stale.
    pub fn submit_input(&mut self, player: PlayerId, frame_id: u32, input: PlayerInput) -> bool {
        self.receptors
            .get_mut(&player)
            .map(|r| r.submit_input(frame_id, input))
            .unwrap_or(false)
    }

    /// Removes receptors silent for longer than `timeout`
    ///
    /// Returns the ids of the removed players so the simulation can drop
    /// them as well.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .receptors
            .values()
            .filter(|r| r.is_timed_out(timeout))
            .map(|r| r.id)
            .collect();

        for id in &timed_out {
            info!("Receptor {} timed out", id);
            self.receptors.remove(id);
        }
        timed_out
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.receptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Receptor> {
        self.receptors.values_mut()
    }

    pub fn len(&self) -> usize {
        self.receptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MovementState;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn moving(direction: f32) -> PlayerInput {
        PlayerInput {
            movement: MovementState::towards(direction),
            ..PlayerInput::default()
        }
    }

    #[test]
    fn test_reordered_frames_apply_newest_only() {
        let mut receptor = Receptor::new(3, addr(8080));

        assert!(receptor.submit_input(5, moving(0.5)));
        assert_eq!(receptor.take_input(), Some(moving(0.5)));

        assert!(!receptor.submit_input(3, moving(0.3)));
        assert_eq!(receptor.take_input(), None);

        assert!(receptor.submit_input(7, moving(0.7)));
        assert_eq!(receptor.take_input(), Some(moving(0.7)));
        assert_eq!(receptor.last_input_frame, Some(7));
    }

    #[test]
    fn test_repeated_frame_is_discarded() {
        let mut receptor = Receptor::new(3, addr(8080));
        assert!(receptor.submit_input(0, moving(1.0)));
        assert!(!receptor.submit_input(0, moving(2.0)));
        assert_eq!(receptor.take_input(), Some(moving(1.0)));
    }

    #[test]
    fn test_input_frames_continue_after_wrap() {
        let mut receptor = Receptor::new(3, addr(8080));
        assert!(receptor.submit_input(MAX_FRAME_ID, moving(1.0)));
        assert!(receptor.submit_input(0, moving(2.0)));
        assert!(!receptor.submit_input(MAX_FRAME_ID - 4, moving(3.0)));
        assert_eq!(receptor.take_input(), Some(moving(2.0)));
    }

    #[test]
    fn test_latest_input_wins_within_a_tick() {
        let mut receptor = Receptor::new(3, addr(8080));
        receptor.submit_input(1, moving(1.0));
        receptor.submit_input(2, moving(2.0));
        assert_eq!(receptor.take_input(), Some(moving(2.0)));
    }

    #[test]
    fn test_frame_ids_wrap_at_24_bits() {
        let mut receptor = Receptor::new(3, addr(8080));
        assert_eq!(receptor.next_frame_id(), 0);
        assert_eq!(receptor.next_frame_id(), 1);

        receptor.server_frame = MAX_FRAME_ID;
        assert_eq!(receptor.next_frame_id(), MAX_FRAME_ID);
        assert_eq!(receptor.next_frame_id(), 0);
    }

    #[test]
    fn test_capacity_and_lookup() {
        let mut manager = ReceptorManager::new(2);
        assert!(manager.add_receptor(3, addr(1)));
        assert!(!manager.add_receptor(3, addr(9)));
        assert!(manager.add_receptor(4, addr(2)));
        assert!(!manager.has_capacity());
        assert!(!manager.add_receptor(5, addr(3)));

        assert_eq!(manager.find_by_addr(addr(2)), Some(4));
        assert_eq!(manager.find_by_addr(addr(3)), None);
        assert_eq!(manager.ids(), vec![3, 4]);

        assert!(manager.remove_receptor(3).is_some());
        assert!(manager.remove_receptor(3).is_none());
        assert!(manager.has_capacity());
    }

    #[test]
    fn test_submit_to_unknown_receptor() {
        let mut manager = ReceptorManager::new(2);
        assert!(!manager.submit_input(9, 1, PlayerInput::default()));
    }

    #[test]
    fn test_timeouts_remove_silent_receptors() {
        let mut manager = ReceptorManager::new(4);
        manager.add_receptor(3, addr(1));
        manager.add_receptor(4, addr(2));

        manager.get_mut(3).unwrap().last_seen = Instant::now() - Duration::from_secs(10);
        assert_eq!(manager.check_timeouts(RECEPTOR_TIMEOUT), vec![3]);
        assert_eq!(manager.len(), 1);
        assert!(manager.check_timeouts(RECEPTOR_TIMEOUT).is_empty());
    }
}
