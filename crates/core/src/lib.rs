//! Core library for cutting map features into Mapbox Vector Tiles.
//!
//! This crate drives feature geometry from a map's source coordinate
//! space into tiled, clipped, simplified and binary-encoded vector
//! tiles. The per-feature pipeline is
//! `transform -> [simplify] -> dedup -> index -> clip -> [translate] -> encode`,
//! orchestrated per layer by a [`Processor`], for single tiles and for
//! wafers (N x N tile batches sharing one feature query).
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilecut_core::{Feature, Layer, Map, MemoryDatasource, Processor, TileOptions};
//! use geo::{point, Geometry};
//!
//! let mut map = Map::new();
//! let ds = MemoryDatasource::new(vec![Feature::new(Geometry::Point(
//!     point!(x: 0.0, y: 0.0),
//! ))]);
//! map.add_layer(Layer::new("points", Arc::new(ds)));
//!
//! let processor = Processor::new(&map);
//! let tile = processor.create_tile(0, 0, 0, &TileOptions::default()).unwrap();
//! let bytes = tile.get_buffer();
//! ```

use thiserror::Error;

// Include the protobuf-generated code
pub mod vector_tile {
    include!(concat!(env!("OUT_DIR"), "/vector_tile.rs"));
}

pub mod bounds;
pub mod clip;
pub mod dedup;
pub mod encoder;
pub mod indexer;
pub mod layer;
pub mod mercator;
pub mod model;
pub mod processor;
pub mod simplify;
pub mod strategy;
pub mod tile;
pub mod translate;

pub use bounds::{GeoBox, TileBox};
pub use clip::{ClipParams, FillType};
pub use encoder::{decode_tile, LayerBuilder, PropertyValue};
pub use model::{Datasource, Feature, Layer, Map, MemoryDatasource, Query, Reprojection, Rule,
    Style};
pub use processor::{ProcessingMode, Processor, TileOptions};
pub use tile::{MercTile, Tile, Wafer};

/// Errors surfaced by tile processing.
#[derive(Error, Debug)]
pub enum Error {
    /// A layer extent that was known to intersect the map extent failed
    /// to reproject back; this path should be unreachable and indicates a
    /// broken projection pair rather than an empty layer.
    #[error("layer '{layer}': extent did not reproject back to map projection")]
    Reprojection { layer: String },

    /// A tile buffer could not be decoded.
    #[error("failed to decode tile: {0}")]
    TileDecode(#[from] prost::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
