//! The per-layer driver: fans features through the geometry pipeline and
//! assembles tiles and wafers.
//!
//! For every map layer the processor builds a [`LayerContext`], iterates
//! the feature cursor and runs each geometry through
//! `transform -> [simplify] -> dedup -> index -> clip -> [translate] -> encode`.
//! The simple tiler writes into one layer builder; the wafer tiler fans
//! every indexed geometry out over the sub-tile grid, skipping sub-tiles
//! whose padded box misses the geometry envelope.
//!
//! Layers can be processed sequentially or with one rayon task per layer;
//! output order always follows map declaration order, and the first layer
//! error is surfaced only after every task has been joined.

use rayon::prelude::*;

use crate::bounds::{GeoBox, TileBox};
use crate::clip::{ClipParams, FillType, GeometryClipper};
use crate::dedup::PointDeduplicator;
use crate::encoder::{EncodedLayer, FeatureEncoder, LayerBuilder};
use crate::indexer::{GeometryIndexer, GeometrySink, IndexedGeometry, IndexedGeometrySink};
use crate::layer::LayerContext;
use crate::model::{Feature, Layer, Map};
use crate::simplify::GeometrySimplifier;
use crate::tile::{MercTile, Wafer};
use crate::translate::GeometryTranslator;
use crate::Result;

/// How the per-layer work units are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// All layers on the calling thread, in declaration order.
    #[default]
    Sequential,
    /// One rayon task per layer. No concurrency inside a layer.
    Parallel,
}

/// Per-request tile parameters.
#[derive(Debug, Clone)]
pub struct TileOptions {
    /// Span of the valid tile coordinate space.
    pub tile_size: u32,
    /// Clipping padding beyond the tile size.
    pub buffer_size: i32,
    /// Scale denominator override; derived from the extent when <= 0.
    pub scale_denominator: f64,
    pub offset_x: i64,
    pub offset_y: i64,
    /// Evaluate features against style rules before encoding.
    pub style_level_filter: bool,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            tile_size: 4096,
            buffer_size: 0,
            scale_denominator: 0.0,
            offset_x: 0,
            offset_y: 0,
            style_level_filter: false,
        }
    }
}

/// Drives a [`Map`] through the tiling pipeline.
pub struct Processor<'a> {
    map: &'a Map,
    scale_factor: f64,
    simplify_distance: f64,
    clip_params: ClipParams,
    mode: ProcessingMode,
}

impl<'a> Processor<'a> {
    pub fn new(map: &'a Map) -> Self {
        Self {
            map,
            scale_factor: 1.0,
            simplify_distance: 0.0,
            clip_params: ClipParams::default(),
            mode: ProcessingMode::default(),
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = scale_factor;
    }

    /// Default simplification distance; layers may override it.
    pub fn set_simplify_distance(&mut self, distance: f64) {
        self.simplify_distance = distance;
    }

    pub fn set_area_threshold(&mut self, area_threshold: f64) {
        self.clip_params.area_threshold = area_threshold;
    }

    pub fn set_strictly_simple(&mut self, strictly_simple: bool) {
        self.clip_params.strictly_simple = strictly_simple;
    }

    pub fn set_multi_polygon_union(&mut self, multi_polygon_union: bool) {
        self.clip_params.multi_polygon_union = multi_polygon_union;
    }

    pub fn set_fill_type(&mut self, fill_type: FillType) {
        self.clip_params.fill_type = fill_type;
    }

    pub fn set_process_all_rings(&mut self, process_all_rings: bool) {
        self.clip_params.process_all_rings = process_all_rings;
    }

    pub fn set_processing_mode(&mut self, mode: ProcessingMode) {
        self.mode = mode;
    }

    /// Cut the Mercator tile at (x, y, z).
    pub fn create_tile(&self, x: u64, y: u64, z: u64, options: &TileOptions) -> Result<MercTile> {
        let mut tile = MercTile::new(x, y, z, options.tile_size, options.buffer_size);
        self.update_tile(&mut tile, options)?;
        Ok(tile)
    }

    /// Process every map layer into an existing tile.
    pub fn update_tile(&self, tile: &mut MercTile, options: &TileOptions) -> Result<()> {
        let extent = *tile.extent();
        let results = self.run_layers(|layer| {
            self.process_layer(layer, extent, options.tile_size, options.buffer_size, options)
        });
        for result in results {
            let encoded = result?;
            if encoded.painted {
                tile.make_painted();
            }
            match encoded.data {
                Some(data) => {
                    tile.add_layer_buffer(encoded.name, data);
                }
                None => {
                    tile.add_empty_layer(encoded.name);
                }
            }
        }
        log::debug!(
            "tile {}/{}/{}: {} layers, {} with data",
            tile.z(),
            tile.x(),
            tile.y(),
            tile.layer_names().len(),
            tile.layer_names().iter().filter(|n| tile.has_layer(n)).count(),
        );
        Ok(())
    }

    /// Cut an N x N wafer of tiles sharing one query per layer.
    pub fn create_wafer(
        &self,
        x: u64,
        y: u64,
        z: u64,
        span: u32,
        options: &TileOptions,
    ) -> Result<Wafer> {
        let span = span.max(1);
        let mut wafer = Wafer::new(x, y, z, span, options.tile_size, options.buffer_size);
        let extent = wafer.extent();

        let results = self.run_layers(|layer| {
            self.process_layer_wafer(
                layer,
                extent,
                options.tile_size,
                options.buffer_size,
                span,
                options,
            )
        });
        for result in results {
            let cells = result?;
            for (tile, encoded) in wafer.tiles_mut().iter_mut().zip(cells) {
                if encoded.painted {
                    tile.make_painted();
                }
                match encoded.data {
                    Some(data) => {
                        tile.add_layer_buffer(encoded.name, data);
                    }
                    None => {
                        tile.add_empty_layer(encoded.name);
                    }
                }
            }
        }
        Ok(wafer)
    }

    /// Fan the per-layer closure out according to the processing mode.
    /// Results come back in declaration order either way.
    fn run_layers<T, F>(&self, process: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(&Layer) -> Result<T> + Sync + Send,
    {
        match self.mode {
            ProcessingMode::Sequential => self.map.layers.iter().map(process).collect(),
            ProcessingMode::Parallel => self.map.layers.par_iter().map(process).collect(),
        }
    }

    fn process_layer(
        &self,
        layer: &Layer,
        tile_extent: GeoBox,
        tile_size: u32,
        buffer_size: i32,
        options: &TileOptions,
    ) -> Result<EncodedLayer> {
        let ctx = LayerContext::new(
            self.map,
            layer,
            tile_extent,
            tile_size,
            buffer_size,
            1,
            self.scale_factor,
            options.scale_denominator,
            options.offset_x,
            options.offset_y,
            options.style_level_filter,
            self.simplify_distance,
        )?;
        if !ctx.is_valid() {
            return Ok(empty_layer(&layer.name));
        }
        let Some(ds) = ctx.datasource() else {
            return Ok(empty_layer(&layer.name));
        };

        let extent = ctx.layer_extent();
        let mut builder = LayerBuilder::new(ctx.name(), extent);
        let tile_box = TileBox::new(0, 0, extent as i64, extent as i64)
            .padded(clip_buffer(buffer_size, extent, tile_size));

        for feature in ds.features(ctx.query()) {
            if options.style_level_filter && !ctx.evaluate_feature(&feature) {
                continue;
            }
            let Some(geom) = ctx.strategy().execute(&feature.geometry) else {
                continue;
            };
            let mut visitor = TileVisitor {
                tile_box,
                params: self.clip_params,
                feature: &feature,
                builder: &mut builder,
            };
            run_chain(geom, ctx.simplify_distance(), &mut visitor);
        }

        Ok(builder.finalize())
    }

    fn process_layer_wafer(
        &self,
        layer: &Layer,
        wafer_extent: GeoBox,
        tile_size: u32,
        buffer_size: i32,
        span: u32,
        options: &TileOptions,
    ) -> Result<Vec<EncodedLayer>> {
        let cells = (span * span) as usize;
        let ctx = LayerContext::new(
            self.map,
            layer,
            wafer_extent,
            tile_size,
            buffer_size,
            span,
            self.scale_factor,
            options.scale_denominator,
            options.offset_x,
            options.offset_y,
            options.style_level_filter,
            self.simplify_distance,
        )?;
        if !ctx.is_valid() {
            return Ok((0..cells).map(|_| empty_layer(&layer.name)).collect());
        }
        let Some(ds) = ctx.datasource() else {
            return Ok((0..cells).map(|_| empty_layer(&layer.name)).collect());
        };

        let extent = ctx.layer_extent();
        // One builder per grid cell, allocated before the feature loop so
        // writers touch disjoint slots.
        let mut builders: Vec<LayerBuilder> = (0..cells)
            .map(|_| LayerBuilder::new(ctx.name(), extent))
            .collect();

        for feature in ds.features(ctx.query()) {
            if options.style_level_filter && !ctx.evaluate_feature(&feature) {
                continue;
            }
            let Some(geom) = ctx.strategy().execute(&feature.geometry) else {
                continue;
            };
            let mut visitor = WaferVisitor {
                step: extent as i64,
                clip_pad: clip_buffer(buffer_size, extent, tile_size),
                span,
                params: self.clip_params,
                feature: &feature,
                builders: &mut builders,
            };
            run_chain(geom, ctx.simplify_distance(), &mut visitor);
        }

        Ok(builders.into_iter().map(|b| b.finalize()).collect())
    }
}

fn empty_layer(name: &str) -> EncodedLayer {
    EncodedLayer {
        name: name.to_string(),
        painted: false,
        data: None,
    }
}

/// Buffer size scaled from tile units into layer-extent units.
fn clip_buffer(buffer_size: i32, layer_extent: u32, tile_size: u32) -> i64 {
    (buffer_size as f64 * layer_extent as f64 / tile_size as f64).round() as i64
}

/// Run one geometry through `[simplify] -> dedup -> index -> visitor`.
fn run_chain<V: IndexedGeometrySink>(
    geom: geo::Geometry<i64>,
    simplify_distance: f64,
    visitor: &mut V,
) {
    let mut indexer = GeometryIndexer::new(visitor);
    let mut dedup = PointDeduplicator::new(&mut indexer);
    if simplify_distance > 0.0 {
        let mut simplifier = GeometrySimplifier::new(simplify_distance, &mut dedup);
        simplifier.geometry(geom);
    } else {
        dedup.geometry(geom);
    }
}

/// Single-tile visitor: clip into the one layer builder.
struct TileVisitor<'f, 'b> {
    tile_box: TileBox,
    params: ClipParams,
    feature: &'f Feature,
    builder: &'b mut LayerBuilder,
}

impl IndexedGeometrySink for TileVisitor<'_, '_> {
    fn indexed(&mut self, geom: &IndexedGeometry) {
        let mut encoder = FeatureEncoder::new(self.feature, self.builder);
        let mut clipper = GeometryClipper::new(self.tile_box, self.params, &mut encoder);
        clipper.indexed(geom);
    }
}

/// Wafer visitor: clip and re-base into every sub-tile whose padded box
/// intersects the indexed envelope.
struct WaferVisitor<'f, 'b> {
    step: i64,
    clip_pad: i64,
    span: u32,
    params: ClipParams,
    feature: &'f Feature,
    builders: &'b mut [LayerBuilder],
}

impl IndexedGeometrySink for WaferVisitor<'_, '_> {
    fn indexed(&mut self, geom: &IndexedGeometry) {
        let mut index = 0usize;
        for j in 0..self.span {
            let oy = j as i64 * self.step;
            for i in 0..self.span {
                let ox = i as i64 * self.step;
                let tile_box =
                    TileBox::new(ox, oy, ox + self.step, oy + self.step).padded(self.clip_pad);
                if geom.envelope().intersects(&tile_box) {
                    let mut encoder = FeatureEncoder::new(self.feature, &mut self.builders[index]);
                    let mut translator = GeometryTranslator::new(-ox, -oy, &mut encoder);
                    let mut clipper =
                        GeometryClipper::new(tile_box, self.params, &mut translator);
                    clipper.indexed(geom);
                }
                index += 1;
            }
        }
    }
}
