//! # Game Client Library
//!
//! Headless client core for the multiplayer game. The server is
//! authoritative and only tells each client what that client's player can
//! see, so the client keeps no simulation of its own:
//!
//! ### World Module (`game`)
//! Object stubs rebuilt from every server frame:
//! - Stale and reordered frames are ignored
//! - Objects missing from a frame are dropped, since frames are complete
//! - Outgoing input frames are numbered so the server can discard old ones
//!
//! ### Chunk Cache Module (`chunk_cache`)
//! Terrain streaming around the camera, separate from entity frames:
//! - Missing chunks are requested at most once per spam interval
//! - Cleared spans remove or clip cached chunks
//! - Far chunks are evicted once the cache grows past its maximum
//!
//! ### Network Module (`network`)
//! The UDP loop: handshake, input frames, server frames and map requests.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         player_name: "alice".to_string(),
//!         ..ClientConfig::default()
//!     };
//!     let mut client = Client::new(config).await?;
//!     client.run().await
//! }
//! ```
//!
//! Rendering is left to whoever embeds the crate: [`game::ClientWorld`]
//! exposes the visible objects and [`chunk_cache::ChunkCache`] the resident
//! terrain.

pub mod chunk_cache;
pub mod game;
pub mod network;
