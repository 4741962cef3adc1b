//! # Game Server Library
//!
//! This library provides the authoritative simulation core of the multiplayer
//! game. It advances every game object each tick, decides per connected
//! player which objects that player may observe, and sends each player a
//! compact frame of exactly that set.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns the entity table. Units move, cast and die here; clients
//! only send input and render what they are told.
//!
//! ### Visibility-Driven Replication
//! Every unit has a sight range. The union of what a player's units see is
//! that player's visible set, and only that set is serialized for them. A
//! player's own hero travels with full detail; everybody else's hero is
//! written as a plain unit.
//!
//! ### Order Arbitration
//! Units that nobody steers directly are driven by orders. Each tick an
//! arbiter decides whether the unit's current order or its default order is
//! in control, and the chosen order yields the unit's action for the tick.
//!
//! ## Module Organization
//!
//! ### Entity Module (`entity`)
//! Entities, units, heroes and abilities, and the table that owns them.
//!
//! ### Player Module (`player`)
//! Human and neutral players and the enmity rules between them.
//!
//! ### Visibility Module (`visibility`)
//! The sight index (who sees what, and who is seen by whom) and the
//! per-player visibility tracker raising seen/unseen transitions.
//!
//! ### Orders, Aggro and Arbiter Modules (`orders`, `aggro`, `arbiter`)
//! The order variants, threat tracking for autonomous units, and the
//! per-unit arbitration between current and default order.
//!
//! ### Game Module (`game`)
//! The simulation tick tying all of the above together.
//!
//! ### Serializer Module (`serializer`)
//! Per-receptor state frames with ownership redaction, and decoding of
//! client input frames.
//!
//! ### Terrain Module (`terrain`)
//! Terrain lookup and the answers to chunk requests.
//!
//! ### Receptor and Network Modules (`receptor`, `network`)
//! Connected players, their input ordering and timeouts, and the UDP loop
//! around the simulation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::SimulationConfig;
//! use server::network::{Server, ServerConfig};
//! use server::terrain::GridTerrain;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:6969".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let terrain = GridTerrain::random(256, 256, 7);
//!     let mut server = Server::new(config, SimulationConfig::default(), Box::new(terrain)).await?;
//!
//!     // Handshakes create players, inputs drive heroes, and every tick each
//!     // connected player receives the frame of what they can see.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! The simulation is single threaded. Network tasks only move datagrams in
//! and out through channels; all simulation state is mutated from the main
//! loop between ticks.

pub mod aggro;
pub mod arbiter;
pub mod entity;
pub mod game;
pub mod network;
pub mod orders;
pub mod player;
pub mod receptor;
pub mod serializer;
pub mod terrain;
pub mod visibility;
