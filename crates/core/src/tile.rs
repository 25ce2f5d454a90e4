//! Tile containers.
//!
//! A [`Tile`] is an ordered set of named, opaque layer buffers plus the
//! geographic extent they were cut from. [`MercTile`] addresses a tile by
//! its XYZ position on the Web Mercator grid, and a [`Wafer`] is an N x N
//! block of Mercator tiles at one zoom processed as a single batch.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::bounds::GeoBox;
use crate::mercator::merc_extent;

/// One vector tile: named layer buffers in insertion order.
#[derive(Debug, Clone)]
pub struct Tile {
    extent: GeoBox,
    tile_size: u32,
    buffer_size: i32,
    names: Vec<String>,
    buffers: HashMap<String, Vec<u8>>,
    painted: bool,
}

impl Tile {
    /// Create an empty tile over a geographic extent.
    pub fn new(extent: GeoBox, tile_size: u32, buffer_size: i32) -> Self {
        Self {
            extent,
            tile_size,
            buffer_size,
            names: Vec::new(),
            buffers: HashMap::new(),
            painted: false,
        }
    }

    /// Span of the valid coordinate space, e.g. 4096.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Clipping padding beyond the tile size.
    pub fn buffer_size(&self) -> i32 {
        self.buffer_size
    }

    /// Geographic extent of the tile.
    pub fn extent(&self) -> &GeoBox {
        &self.extent
    }

    /// Record an encoded layer buffer. Returns false when a layer of this
    /// name was already recorded; nothing is overwritten.
    pub fn add_layer_buffer(&mut self, name: impl Into<String>, data: Vec<u8>) -> bool {
        let name = name.into();
        if self.names.contains(&name) {
            return false;
        }
        self.buffers.insert(name.clone(), data);
        self.names.push(name);
        true
    }

    /// Record a layer that produced no features. Keeps the name reserved
    /// so sublayer recursion cannot write it twice.
    pub fn add_empty_layer(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.names.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Whether a non-empty layer of this name was written.
    pub fn has_layer(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// All recorded layer names (empty layers included), in order.
    pub fn layer_names(&self) -> &[String] {
        &self.names
    }

    /// True when no layer holds any encoded features.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn is_painted(&self) -> bool {
        self.painted
    }

    pub fn make_painted(&mut self) {
        self.painted = true;
    }

    /// The tile wire buffer: the concatenation of the layer buffers in
    /// insertion order. Layer buffers are individually valid protobuf
    /// tile messages, so their concatenation is too.
    pub fn get_buffer(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for name in &self.names {
            if let Some(data) = self.buffers.get(name) {
                out.extend_from_slice(data);
            }
        }
        out
    }
}

/// A tile addressed on the Web Mercator XYZ grid.
#[derive(Debug, Clone)]
pub struct MercTile {
    x: u64,
    y: u64,
    z: u64,
    tile: Tile,
}

impl MercTile {
    /// Create the tile at grid position (x, y) of zoom z.
    pub fn new(x: u64, y: u64, z: u64, tile_size: u32, buffer_size: i32) -> Self {
        Self {
            x,
            y,
            z,
            tile: Tile::new(merc_extent(x, y, z), tile_size, buffer_size),
        }
    }

    pub fn x(&self) -> u64 {
        self.x
    }

    pub fn y(&self) -> u64 {
        self.y
    }

    pub fn z(&self) -> u64 {
        self.z
    }
}

impl Deref for MercTile {
    type Target = Tile;

    fn deref(&self) -> &Tile {
        &self.tile
    }
}

impl DerefMut for MercTile {
    fn deref_mut(&mut self) -> &mut Tile {
        &mut self.tile
    }
}

/// An N x N block of same-zoom tiles sharing one feature query.
///
/// For transform purposes the wafer behaves like one big tile spanning
/// `span * tile_size` integer units.
#[derive(Debug, Clone)]
pub struct Wafer {
    x: u64,
    y: u64,
    z: u64,
    span: u32,
    member_size: u32,
    buffer_size: i32,
    tiles: Vec<MercTile>,
}

impl Wafer {
    /// Create the wafer whose north-west tile is (x, y) at zoom z,
    /// covering `span` tiles in each direction.
    pub fn new(x: u64, y: u64, z: u64, span: u32, tile_size: u32, buffer_size: i32) -> Self {
        let mut tiles = Vec::with_capacity((span * span) as usize);
        for j in y..y + span as u64 {
            for i in x..x + span as u64 {
                tiles.push(MercTile::new(i, j, z, tile_size, buffer_size));
            }
        }
        Self {
            x,
            y,
            z,
            span,
            member_size: tile_size,
            buffer_size,
            tiles,
        }
    }

    pub fn x(&self) -> u64 {
        self.x
    }

    pub fn y(&self) -> u64 {
        self.y
    }

    pub fn z(&self) -> u64 {
        self.z
    }

    /// Tiles per side.
    pub fn span(&self) -> u32 {
        self.span
    }

    /// Integer span of the whole wafer: `span * member tile size`.
    pub fn tile_size(&self) -> u32 {
        self.span * self.member_size
    }

    pub fn buffer_size(&self) -> i32 {
        self.buffer_size
    }

    /// Member tiles in row-major order, north-west first.
    pub fn tiles(&self) -> &[MercTile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [MercTile] {
        &mut self.tiles
    }

    /// The tile at wafer-local column `i`, row `j`.
    pub fn tile(&self, i: u32, j: u32) -> &MercTile {
        &self.tiles[(j * self.span + i) as usize]
    }

    /// Aggregate geographic extent: the union of all member extents.
    pub fn extent(&self) -> GeoBox {
        let mut bounds = GeoBox::empty();
        for tile in &self.tiles {
            bounds.expand_to_include(tile.extent());
        }
        bounds
    }

    /// Whether any member tile carries a non-empty layer of this name.
    pub fn has_layer(&self, name: &str) -> bool {
        self.tiles.iter().any(|t| t.has_layer(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercator::MERCATOR_BOUND;

    #[test]
    fn test_tile_layer_ordering_and_duplicates() {
        let mut tile = Tile::new(merc_extent(0, 0, 0), 4096, 64);
        assert!(tile.add_layer_buffer("water", vec![1, 2]));
        assert!(tile.add_empty_layer("landuse"));
        assert!(tile.add_layer_buffer("roads", vec![3]));

        assert!(!tile.add_layer_buffer("water", vec![9]));
        assert!(!tile.add_empty_layer("roads"));

        assert_eq!(tile.layer_names(), ["water", "landuse", "roads"]);
        assert!(tile.has_layer("water"));
        assert!(!tile.has_layer("landuse"));
        assert_eq!(tile.get_buffer(), vec![1, 2, 3]);
    }

    #[test]
    fn test_tile_empty_and_painted() {
        let mut tile = Tile::new(merc_extent(0, 0, 0), 4096, 0);
        assert!(tile.is_empty());
        assert!(!tile.is_painted());

        tile.make_painted();
        tile.add_empty_layer("nothing");
        assert!(tile.is_empty());
        assert!(tile.is_painted());
        assert!(tile.get_buffer().is_empty());
    }

    #[test]
    fn test_wafer_2x2_grid_positions() {
        let wafer = Wafer::new(0, 0, 1, 2, 1024, 20);

        assert_eq!(wafer.span(), 2);
        assert_eq!(wafer.tiles().len(), 4);

        let expected = [(0, 0), (1, 0), (0, 1), (1, 1)];
        for (tile, (x, y)) in wafer.tiles().iter().zip(expected) {
            assert_eq!(tile.x(), x);
            assert_eq!(tile.y(), y);
            assert_eq!(tile.z(), 1);
        }
    }

    #[test]
    fn test_wafer_tile_lookup() {
        let wafer = Wafer::new(4, 10, 5, 3, 4096, 0);
        let t = wafer.tile(2, 1);
        assert_eq!(t.x(), 6);
        assert_eq!(t.y(), 11);
    }

    #[test]
    fn test_wafer_aggregate_extent_is_union() {
        // An 8x8 wafer at z3 covers the whole world.
        let wafer = Wafer::new(0, 0, 3, 8, 4096, 64);
        let extent = wafer.extent();
        assert!((extent.min_x + MERCATOR_BOUND).abs() < 1e-6);
        assert!((extent.min_y + MERCATOR_BOUND).abs() < 1e-6);
        assert!((extent.max_x - MERCATOR_BOUND).abs() < 1e-6);
        assert!((extent.max_y - MERCATOR_BOUND).abs() < 1e-6);

        assert_eq!(wafer.tile_size(), 4096 * 8);
        assert_eq!(wafer.buffer_size(), 64);
    }
}
