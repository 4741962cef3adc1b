//! Terrain lookup served to clients chunk by chunk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{MapChunkId, Rectangle, TerrainTransfer, TerrainType, Vector2};

/// Read access to a map's terrain.
pub trait TerrainMap {
    /// Tiles that exist on the map.
    fn bounds(&self) -> Rectangle;

    /// Tile at (x, y), or `None` outside the map.
    fn tile_at(&self, x: i32, y: i32) -> Option<TerrainType>;

    fn terrain_at(&self, position: Vector2) -> TerrainType {
        self.tile_at(position.x.floor() as i32, position.y.floor() as i32)
            .unwrap_or_default()
    }

    /// Tiles of `span` in row-major order; tiles outside the map are
    /// [`TerrainType::None`].
    fn get_map(&self, span: &Rectangle) -> Vec<TerrainType> {
        let (fx, fy) = span.far_position();
        let mut tiles = Vec::with_capacity(span.area());
        for y in span.y..fy {
            for x in span.x..fx {
                tiles.push(self.tile_at(x, y).unwrap_or_default());
            }
        }
        tiles
    }
}

/// The answer to a chunk request: a clear for chunks entirely off the map,
/// the chunk's tiles otherwise.
pub fn chunk_transfer(map: &dyn TerrainMap, chunk: MapChunkId) -> TerrainTransfer {
    let span = chunk.span();
    match map.bounds().intersect(&span) {
        None => TerrainTransfer::clear(span),
        Some(_) => TerrainTransfer::tiles(span, map.get_map(&span)),
    }
}

/// A rectangular map stored as a flat tile grid.
#[derive(Debug, Clone)]
pub struct GridTerrain {
    bounds: Rectangle,
    tiles: Vec<TerrainType>,
}

impl GridTerrain {
    pub fn filled(width: i32, height: i32, terrain: TerrainType) -> Self {
        let bounds = Rectangle::new(0, 0, width.max(0), height.max(0));
        Self {
            tiles: vec![terrain; bounds.area()],
            bounds,
        }
    }

    /// Grass with random patches of other terrain, reproducible per seed.
    pub fn random(width: i32, height: i32, seed: u64) -> Self {
        const PATCHES: [TerrainType; 5] = [
            TerrainType::Dirt,
            TerrainType::Sand,
            TerrainType::Stone,
            TerrainType::Water,
            TerrainType::Snow,
        ];

        let mut map = Self::filled(width, height, TerrainType::Grass);
        if map.bounds.is_empty() {
            return map;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let patch_count = map.bounds.area() / 256 + 1;
        for _ in 0..patch_count {
            let cx = rng.gen_range(0..map.bounds.width);
            let cy = rng.gen_range(0..map.bounds.height);
            let radius = rng.gen_range(1..6);
            let terrain = PATCHES[rng.gen_range(0..PATCHES.len())];
            for y in cy - radius..=cy + radius {
                for x in cx - radius..=cx + radius {
                    if (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius {
                        map.set(x, y, terrain);
                    }
                }
            }
        }
        map
    }

    /// Returns false outside the map.
    pub fn set(&mut self, x: i32, y: i32, terrain: TerrainType) -> bool {
        match self.bounds.index_of(x, y) {
            Some(i) => {
                self.tiles[i] = terrain;
                true
            }
            None => false,
        }
    }
}

impl TerrainMap for GridTerrain {
    fn bounds(&self) -> Rectangle {
        self.bounds
    }

    fn tile_at(&self, x: i32, y: i32) -> Option<TerrainType> {
        self.bounds
            .index_of(x, y)
            .and_then(|i| self.tiles.get(i))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CHUNK_SIZE;

    #[test]
    fn test_chunk_outside_map_is_cleared() {
        let map = GridTerrain::filled(64, 64, TerrainType::Dirt);
        let transfer = chunk_transfer(&map, MapChunkId::new(5, 5));
        assert!(!transfer.has_map());
        assert_eq!(transfer.span, MapChunkId::new(5, 5).span());

        let transfer = chunk_transfer(&map, MapChunkId::new(-1, 0));
        assert!(!transfer.has_map());
    }

    #[test]
    fn test_chunk_at_the_coordinate_limit_is_cleared() {
        let map = GridTerrain::filled(64, 64, TerrainType::Dirt);
        for chunk in [
            MapChunkId::new(i32::MAX / CHUNK_SIZE, 0),
            MapChunkId::new(i32::MIN, i32::MIN),
        ] {
            assert!(!chunk_transfer(&map, chunk).has_map());
        }
    }

    #[test]
    fn test_partial_chunk_pads_with_none() {
        let map = GridTerrain::filled(40, 40, TerrainType::Sand);
        let transfer = chunk_transfer(&map, MapChunkId::new(1, 1));
        assert!(transfer.is_well_formed());
        assert_eq!(transfer.tile_at(CHUNK_SIZE, CHUNK_SIZE), Some(TerrainType::Sand));
        assert_eq!(transfer.tile_at(39, 39), Some(TerrainType::Sand));
        assert_eq!(transfer.tile_at(40, 39), Some(TerrainType::None));
        assert_eq!(transfer.tile_at(63, 63), Some(TerrainType::None));
    }

    #[test]
    fn test_set_and_lookup() {
        let mut map = GridTerrain::filled(4, 4, TerrainType::Grass);
        assert!(map.set(1, 2, TerrainType::Water));
        assert!(!map.set(4, 0, TerrainType::Water));
        assert_eq!(map.tile_at(1, 2), Some(TerrainType::Water));
        assert_eq!(map.terrain_at(Vector2::new(1.7, 2.2)), TerrainType::Water);
        assert_eq!(map.terrain_at(Vector2::new(-0.5, 0.0)), TerrainType::None);
    }

    #[test]
    fn test_random_map_is_reproducible() {
        let a = GridTerrain::random(64, 64, 42);
        let b = GridTerrain::random(64, 64, 42);
        let span = Rectangle::new(0, 0, 64, 64);
        assert_eq!(a.get_map(&span), b.get_map(&span));
        assert!(a.get_map(&span).iter().all(|t| *t != TerrainType::None));
    }
}
