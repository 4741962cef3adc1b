//! Client-side terrain streaming.
//!
//! The cache keeps the chunks around the camera resident. Missing chunks are
//! requested from the server at most once per [`SPAM_INTERVAL_MS`], and once
//! the cache grows past [`MAX_CHUNKS`] the chunks farthest from the camera
//! are evicted.

use log::{debug, warn};
use shared::{MapChunkId, Rectangle, TerrainTransfer, TerrainType, Vector2, CHUNK_SIZE};
use std::collections::HashMap;

/// Minimum time between two requests for the same chunk.
pub const SPAM_INTERVAL_MS: u64 = 5000;

/// Cache size above which far chunks are evicted.
pub const MAX_CHUNKS: usize = 10_000;

/// What the player is looking at, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub center: Vector2,
    /// Width and height of the visible area.
    pub viewport: Vector2,
}

impl Camera {
    pub fn new(center: Vector2, viewport: Vector2) -> Self {
        Self { center, viewport }
    }
}

#[derive(Debug, Clone)]
pub struct TerrainChunk {
    pub id: MapChunkId,
    tiles: Vec<TerrainType>,
    /// Whether the renderable buffer matches the tiles.
    has_buffer: bool,
}

impl TerrainChunk {
    pub fn new(id: MapChunkId) -> Self {
        Self {
            id,
            tiles: vec![TerrainType::None; (CHUNK_SIZE * CHUNK_SIZE) as usize],
            has_buffer: false,
        }
    }

    pub fn span(&self) -> Rectangle {
        self.id.span()
    }

    /// Tile at map coordinates, if they fall inside this chunk.
    pub fn tile_at(&self, x: i32, y: i32) -> Option<TerrainType> {
        let index = self.span().index_of(x, y)?;
        self.tiles.get(index).copied()
    }

    /// Copies the part of `transfer` overlapping this chunk.
    pub fn set_tiles(&mut self, transfer: &TerrainTransfer) {
        let span = self.span();
        let Some(overlap) = span.intersect(&transfer.span) else {
            return;
        };
        for y in overlap.y..overlap.y + overlap.height {
            for x in overlap.x..overlap.x + overlap.width {
                if let (Some(i), Some(tile)) = (span.index_of(x, y), transfer.tile_at(x, y)) {
                    self.tiles[i] = tile;
                }
            }
        }
        self.has_buffer = false;
    }

    /// Resets the tiles overlapping `area` to no terrain.
    pub fn clear_tiles(&mut self, area: &Rectangle) {
        let span = self.span();
        let Some(overlap) = span.intersect(area) else {
            return;
        };
        for y in overlap.y..overlap.y + overlap.height {
            for x in overlap.x..overlap.x + overlap.width {
                if let Some(i) = span.index_of(x, y) {
                    self.tiles[i] = TerrainType::None;
                }
            }
        }
        self.has_buffer = false;
    }

    pub fn has_buffer(&self) -> bool {
        self.has_buffer
    }

    /// Called by the renderer once it rebuilt its buffer from the tiles.
    pub fn mark_buffered(&mut self) {
        self.has_buffer = true;
    }
}

#[derive(Debug)]
pub struct ChunkCache {
    camera: Camera,
    chunks: HashMap<MapChunkId, TerrainChunk>,
    /// Time of the last request per chunk, in ms.
    requested_at: HashMap<MapChunkId, u64>,
    outgoing: Vec<MapChunkId>,
    max_chunks: usize,
    spam_interval_ms: u64,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::with_limits(MAX_CHUNKS, SPAM_INTERVAL_MS)
    }

    pub fn with_limits(max_chunks: usize, spam_interval_ms: u64) -> Self {
        Self {
            camera: Camera::new(Vector2::ZERO, Vector2::new(32.0, 18.0)),
            chunks: HashMap::new(),
            requested_at: HashMap::new(),
            outgoing: Vec::new(),
            max_chunks,
            spam_interval_ms,
        }
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Chunks intersecting the viewport grown by `margin` on every side.
    pub fn enumerate_nearby_chunks(&self, margin: f32) -> Vec<MapChunkId> {
        let half = Vector2::new(
            self.camera.viewport.x / 2.0 + margin,
            self.camera.viewport.y / 2.0 + margin,
        );
        MapChunkId::chunks_between(self.camera.center - half, self.camera.center + half)
    }

    /// Queues a request for `id` unless it is cached or was requested less
    /// than the spam interval ago. Returns whether a request was queued.
    pub fn try_request_chunk(&mut self, id: MapChunkId, now_ms: u64) -> bool {
        if self.chunks.contains_key(&id) {
            return false;
        }
        if let Some(&last) = self.requested_at.get(&id) {
            if now_ms.saturating_sub(last) < self.spam_interval_ms {
                return false;
            }
        }
        self.requested_at.insert(id, now_ms);
        self.outgoing.push(id);
        true
    }

    /// Requests queued since the last call, in queue order.
    pub fn drain_requests(&mut self) -> Vec<MapChunkId> {
        std::mem::take(&mut self.outgoing)
    }

    /// Applies terrain received from the server.
    ///
    /// A clear removes the cached chunks it fully covers and blanks the
    /// tiles of cached chunks it only overlaps. Tiles create or update every
    /// chunk they touch. Malformed transfers, and tile transfers spanning
    /// more chunks than the cache may hold, are dropped and return false.
    pub fn handle_terrain(&mut self, transfer: &TerrainTransfer) -> bool {
        if !transfer.is_well_formed() {
            warn!("Dropping malformed terrain transfer for {:?}", transfer.span);
            return false;
        }

        if !transfer.has_map() {
            self.clear_span(&transfer.span);
            return true;
        }

        if transfer.span.chunk_count() > self.max_chunks as u64 {
            warn!("Dropping oversized terrain transfer for {:?}", transfer.span);
            return false;
        }
        for id in MapChunkId::chunks_in_span(&transfer.span) {
            self.chunks
                .entry(id)
                .or_insert_with(|| TerrainChunk::new(id))
                .set_tiles(transfer);
        }
        true
    }

    fn clear_span(&mut self, area: &Rectangle) {
        let touched: Vec<MapChunkId> = self
            .chunks
            .keys()
            .filter(|id| area.intersect(&id.span()).is_some())
            .copied()
            .collect();

        for id in touched {
            let span = id.span();
            if area.intersect(&span) == Some(span) {
                self.chunks.remove(&id);
                debug!("Chunk {:?} cleared", id);
            } else if let Some(chunk) = self.chunks.get_mut(&id) {
                chunk.clear_tiles(area);
            }
        }
    }

    /// Evicts far chunks once the cache exceeds its maximum, keeping the
    /// three quarters of the maximum nearest to the camera. Evicted chunks
    /// lose their request timestamp so they can be requested again.
    pub fn cleanup_chunks(&mut self) -> usize {
        if self.chunks.len() <= self.max_chunks {
            return 0;
        }
        let retain = self.max_chunks * 3 / 4;
        let center = self.camera.center;

        let mut ranked: Vec<(f32, MapChunkId)> = self
            .chunks
            .keys()
            .map(|id| (id.center().distance_to(center), *id))
            .collect();
        // farthest first
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        let evict = ranked.len() - retain;
        for (_, id) in ranked.into_iter().take(evict) {
            self.chunks.remove(&id);
            self.requested_at.remove(&id);
        }
        debug!("Evicted {} terrain chunks", evict);
        evict
    }

    /// Per-frame upkeep: requests missing chunks around the camera, then
    /// evicts if over budget.
    pub fn update(&mut self, now_ms: u64, margin: f32) {
        for id in self.enumerate_nearby_chunks(margin) {
            self.try_request_chunk(id, now_ms);
        }
        self.cleanup_chunks();
    }

    pub fn chunk(&self, id: MapChunkId) -> Option<&TerrainChunk> {
        self.chunks.get(&id)
    }

    pub fn chunk_mut(&mut self, id: MapChunkId) -> Option<&mut TerrainChunk> {
        self.chunks.get_mut(&id)
    }

    pub fn contains(&self, id: MapChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<TerrainType> {
        self.chunks.get(&MapChunkId::from_tile(x, y))?.tile_at(x, y)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
