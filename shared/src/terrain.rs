//! Terrain vocabulary: tile types, tile rectangles and map chunks.
//!
//! Terrain is addressed in whole tiles. The map is cut into square chunks of
//! [`CHUNK_SIZE`] tiles, which are the unit of network transfer and of client
//! caching.

use crate::Vector2;
use serde::{Deserialize, Serialize};

/// Side length of a chunk, in tiles.
pub const CHUNK_SIZE: i32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainType {
    #[default]
    None,
    Dirt,
    Grass,
    Sand,
    Stone,
    Snow,
    Water,
    DeepWater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the bottom-right tile, saturating at `i32::MAX`.
    pub fn far_position(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        )
    }

    /// One past the bottom-right tile, or `None` if it does not fit in i32.
    pub fn checked_far_position(&self) -> Option<(i32, i32)> {
        Some((
            self.x.checked_add(self.width)?,
            self.y.checked_add(self.height)?,
        ))
    }

    /// Non-empty and addressable without overflow.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.checked_far_position().is_some()
    }

    /// Number of chunks the rectangle overlaps.
    pub fn chunk_count(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let (fx, fy) = self.far_position();
        let lo = MapChunkId::from_tile(self.x, self.y);
        let hi = MapChunkId::from_tile(fx - 1, fy - 1);
        let columns = (hi.x as i64 - lo.x as i64 + 1) as u64;
        let rows = (hi.y as i64 - lo.y as i64 + 1) as u64;
        columns * rows
    }

    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.width as usize).saturating_mul(self.height as usize)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (fx, fy) = self.far_position();
        x >= self.x && x < fx && y >= self.y && y < fy
    }

    pub fn intersect(&self, other: &Rectangle) -> Option<Rectangle> {
        let (ax, ay) = self.far_position();
        let (bx, by) = other.far_position();

        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = ax.min(bx);
        let y2 = ay.min(by);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rectangle::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Row-major index of tile (x, y) within this rectangle.
    pub fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        let row = y as i64 - self.y as i64;
        let column = x as i64 - self.x as i64;
        usize::try_from(row * self.width as i64 + column).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapChunkId {
    pub x: i32,
    pub y: i32,
}

impl MapChunkId {
    /// Largest coordinate whose span stays addressable in i32 tiles.
    pub const MAX_COORD: i32 = i32::MAX / CHUNK_SIZE - 1;

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether the chunk lies within [`MapChunkId::MAX_COORD`] on both axes.
    pub fn is_valid(&self) -> bool {
        (-Self::MAX_COORD..=Self::MAX_COORD).contains(&self.x)
            && (-Self::MAX_COORD..=Self::MAX_COORD).contains(&self.y)
    }

    pub fn from_tile(tx: i32, ty: i32) -> Self {
        Self::new(tx.div_euclid(CHUNK_SIZE), ty.div_euclid(CHUNK_SIZE))
    }

    pub fn from_position(pos: Vector2) -> Self {
        Self::from_tile(pos.x.floor() as i32, pos.y.floor() as i32)
    }

    pub fn span(&self) -> Rectangle {
        Rectangle::new(
            self.x.saturating_mul(CHUNK_SIZE),
            self.y.saturating_mul(CHUNK_SIZE),
            CHUNK_SIZE,
            CHUNK_SIZE,
        )
    }

    pub fn center(&self) -> Vector2 {
        let half = CHUNK_SIZE as f32 / 2.0;
        Vector2::new(
            self.x as f32 * CHUNK_SIZE as f32 + half,
            self.y as f32 * CHUNK_SIZE as f32 + half,
        )
    }

    /// All chunks between the chunk holding `low` and the chunk holding
    /// `high`, both inclusive.
    pub fn chunks_between(low: Vector2, high: Vector2) -> Vec<MapChunkId> {
        let lo = Self::from_position(low);
        let hi = Self::from_position(high);
        Self::chunk_range(lo, hi)
    }

    /// All chunks overlapping a tile rectangle.
    pub fn chunks_in_span(span: &Rectangle) -> Vec<MapChunkId> {
        if span.is_empty() {
            return Vec::new();
        }
        let (fx, fy) = span.far_position();
        let lo = Self::from_tile(span.x, span.y);
        let hi = Self::from_tile(fx - 1, fy - 1);
        Self::chunk_range(lo, hi)
    }

    fn chunk_range(lo: MapChunkId, hi: MapChunkId) -> Vec<MapChunkId> {
        let mut chunks = Vec::new();
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                chunks.push(MapChunkId::new(x, y));
            }
        }
        chunks
    }
}

/// Terrain payload. No data means "clear this span"; data holds the span's
/// tiles in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainTransfer {
    pub span: Rectangle,
    pub data: Option<Vec<TerrainType>>,
}

impl TerrainTransfer {
    pub fn clear(span: Rectangle) -> Self {
        Self { span, data: None }
    }

    pub fn tiles(span: Rectangle, data: Vec<TerrainType>) -> Self {
        Self {
            span,
            data: Some(data),
        }
    }

    pub fn has_map(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the payload is self-consistent. Transfers failing this are
    /// dropped by receivers.
    pub fn is_well_formed(&self) -> bool {
        if !self.span.is_valid() {
            return false;
        }
        match &self.data {
            Some(tiles) => tiles.len() == self.span.area(),
            None => true,
        }
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<TerrainType> {
        let index = self.span.index_of(x, y)?;
        self.data.as_ref()?.get(index).copied()
    }
}
