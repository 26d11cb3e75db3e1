//! Terrain tile coordinates and the per-tile index
//!
//! Terrain data unrelated to any one anchor is keyed by the tile it belongs
//! to. [`TerrainTileCoord`] quantizes world positions onto the tile grid and
//! [`TileIndex`] maps coordinates to per-tile payloads.

use crate::error::Result;
use crate::hash_map::StableHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer pair identifying one terrain tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerrainTileCoord {
    /// Tile column along world X
    pub tile_x: i32,
    /// Tile row along world Z
    pub tile_z: i32,
}

impl TerrainTileCoord {
    /// Build from tile indices
    pub const fn new(tile_x: i32, tile_z: i32) -> Self {
        Self { tile_x, tile_z }
    }

    /// Quantize a world-space position onto the tile grid
    pub fn from_world(x: f32, z: f32, tile_size: f32) -> Self {
        Self {
            tile_x: (x / tile_size).floor() as i32,
            tile_z: (z / tile_size).floor() as i32,
        }
    }

    /// The eight surrounding tiles, row by row
    pub fn neighbors(&self) -> [TerrainTileCoord; 8] {
        let (x, z) = (self.tile_x, self.tile_z);
        [
            Self::new(x - 1, z - 1),
            Self::new(x, z - 1),
            Self::new(x + 1, z - 1),
            Self::new(x - 1, z),
            Self::new(x + 1, z),
            Self::new(x - 1, z + 1),
            Self::new(x, z + 1),
            Self::new(x + 1, z + 1),
        ]
    }
}

impl fmt::Display for TerrainTileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tile_x, self.tile_z)
    }
}

/// Per-tile payload index over [`StableHashMap`]
#[derive(Debug, Default)]
pub struct TileIndex<T> {
    tiles: StableHashMap<TerrainTileCoord, T>,
}

impl<T> TileIndex<T> {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            tiles: StableHashMap::new(),
        }
    }

    /// Number of indexed tiles
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Check whether no tiles are indexed
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Insert or replace a tile payload, returning the previous one
    pub fn insert(&mut self, coord: TerrainTileCoord, payload: T) -> Result<Option<T>> {
        self.tiles.insert(coord, payload)
    }

    /// Payload for a tile
    pub fn get(&self, coord: TerrainTileCoord) -> Option<&T> {
        self.tiles.get(&coord)
    }

    /// Mutable payload for a tile
    pub fn get_mut(&mut self, coord: TerrainTileCoord) -> Option<&mut T> {
        self.tiles.get_mut(&coord)
    }

    /// Remove a tile payload
    pub fn remove(&mut self, coord: TerrainTileCoord) -> Option<T> {
        self.tiles.remove(&coord)
    }

    /// Check whether a tile is indexed
    pub fn contains(&self, coord: TerrainTileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    /// Iterate over `(coord, payload)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&TerrainTileCoord, &T)> {
        self.tiles.iter()
    }

    /// Payloads of the tiles surrounding `coord` that are indexed
    pub fn neighbors_of(&self, coord: TerrainTileCoord) -> Vec<(TerrainTileCoord, &T)> {
        coord
            .neighbors()
            .into_iter()
            .filter_map(|n| self.tiles.get(&n).map(|payload| (n, payload)))
            .collect()
    }
}
