//! Per-layer processing context.
//!
//! One [`LayerContext`] is built at the start of a layer's processing pass
//! and dropped once the layer's buffers are committed. It computes, in
//! order: the layer extent, the buffered target extent, the buffered
//! source extent (through the layer's reprojection), the effective scale
//! denominator, layer activity, the clipped query extent and the viewport
//! transform strategy.
//!
//! A layer that fails any validity check is marked invalid; the caller
//! records it as an explicitly empty layer and moves on. The single fatal
//! path is a re-projection failure on the already-intersecting branch,
//! which should be unreachable for a sane projection pair.

use std::sync::Arc;

use crate::bounds::GeoBox;
use crate::mercator;
use crate::model::{Datasource, Feature, Layer, Map, Query, Rule};
use crate::strategy::{TransformStrategy, ViewTransform};
use crate::{Error, Result};

/// Pixel span of the legacy image tile that layer buffer sizes and query
/// resolutions are expressed against.
const LEGACY_IMAGE_SIZE: f64 = 256.0;

/// Fallback layer extent when the datasource cannot provide one.
const DEFAULT_LAYER_EXTENT: u32 = 4096;

/// Active rules of one style, split into filtered and else rules.
#[derive(Clone, Default)]
pub struct RuleCache {
    if_rules: Vec<Rule>,
    else_rules: Vec<Rule>,
}

/// Transient state driving one layer through the pipeline.
pub struct LayerContext {
    valid: bool,
    name: String,
    layer_extent: u32,
    scale_denominator: f64,
    datasource: Option<Arc<dyn Datasource>>,
    target_buffered_extent: GeoBox,
    source_buffered_extent: GeoBox,
    query: Query,
    strategy: TransformStrategy,
    simplify_distance: f64,
    active_rules: Vec<RuleCache>,
}

impl LayerContext {
    /// Compute the processing state for `layer` within `tile_extent`.
    ///
    /// `span` is 1 for a single tile; a wafer passes its grid span so the
    /// viewport covers `span * tile_size` integer units.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        map: &Map,
        layer: &Layer,
        tile_extent: GeoBox,
        tile_size: u32,
        buffer_size: i32,
        span: u32,
        scale_factor: f64,
        scale_denominator: f64,
        offset_x: i64,
        offset_y: i64,
        style_level_filter: bool,
        default_simplify_distance: f64,
    ) -> Result<Self> {
        let mut valid = true;
        let datasource = layer.datasource.clone();
        let reprojection = layer.reprojection.clone();
        let name = layer.name.clone();

        let layer_extent = calc_extent(&datasource, tile_size, &name, &mut valid);

        let target_buffered_extent =
            calc_target_buffered_extent(&tile_extent, buffer_size, layer, layer_extent, map);
        let source_buffered_extent = match &reprojection {
            None => target_buffered_extent,
            Some(projection) => match projection.map_to_layer_box(&target_buffered_extent) {
                Some(b) => b,
                None => {
                    log::debug!("layer '{}': buffered extent does not reproject", name);
                    valid = false;
                    target_buffered_extent
                }
            },
        };

        // Derive the scale denominator when the caller left it unset.
        let mut scale_denom = scale_denominator;
        if scale_denom <= 0.0 {
            let scale = tile_extent.width() / LEGACY_IMAGE_SIZE;
            scale_denom = mercator::scale_denominator(scale, map.is_geographic);
        }
        scale_denom *= scale_factor;

        if !is_active(map, layer, scale_denom, style_level_filter) {
            log::debug!(
                "layer '{}': inactive at scale denominator {}",
                name,
                scale_denom
            );
            valid = false;
        }

        // Clip the layer's native envelope against the buffered extents,
        // trying the forward intersection first and falling back to
        // back-projecting the layer envelope.
        let mut query_extent = datasource
            .as_ref()
            .and_then(|ds| ds.envelope())
            .unwrap_or_else(GeoBox::empty);
        if !query_extent.is_valid() {
            valid = false;
        } else if source_buffered_extent.is_valid()
            && source_buffered_extent.intersects(&query_extent)
        {
            query_extent.clip(&source_buffered_extent);
        } else if reprojection.is_none() {
            log::debug!("layer '{}': no extent intersection", name);
            valid = false;
        } else if let Some(projection) = &reprojection {
            match projection.layer_to_map_box(&query_extent) {
                Some(back_projected) if target_buffered_extent.intersects(&back_projected) => {
                    let mut clipped = back_projected;
                    clipped.clip(&target_buffered_extent);
                    // This branch only runs for an extent known to
                    // intersect in map coordinates; failing to map it back
                    // is a logic error, not an empty layer.
                    query_extent = projection.map_to_layer_box(&clipped).ok_or_else(|| {
                        Error::Reprojection {
                            layer: name.clone(),
                        }
                    })?;
                }
                _ => {
                    log::debug!("layer '{}': no extent intersection after reprojection", name);
                    valid = false;
                }
            }
        }

        let qw = if query_extent.is_valid() && query_extent.width() > 0.0 {
            query_extent.width()
        } else {
            1.0
        };
        let qh = if query_extent.is_valid() && query_extent.height() > 0.0 {
            query_extent.height()
        } else {
            1.0
        };
        let query = Query {
            extent: query_extent,
            resolution: (LEGACY_IMAGE_SIZE / qw, LEGACY_IMAGE_SIZE / qh),
            scale_denominator: scale_denom,
            property_names: datasource
                .as_ref()
                .map(|ds| ds.field_names())
                .unwrap_or_default(),
        };

        let span_units = layer_extent * span.max(1);
        let view = ViewTransform::new(span_units, span_units, tile_extent, offset_x, offset_y);
        let strategy = match reprojection {
            None => TransformStrategy::Direct(view),
            Some(projection) => TransformStrategy::Reproject(projection, view),
        };

        let active_rules = if style_level_filter {
            get_active_rules(map, layer, scale_denom)
        } else {
            Vec::new()
        };

        Ok(Self {
            valid,
            name,
            layer_extent,
            scale_denominator: scale_denom,
            datasource,
            target_buffered_extent,
            source_buffered_extent,
            query,
            strategy,
            simplify_distance: layer.simplify_distance.unwrap_or(default_simplify_distance),
            active_rules,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_extent(&self) -> u32 {
        self.layer_extent
    }

    pub fn scale_denominator(&self) -> f64 {
        self.scale_denominator
    }

    pub fn datasource(&self) -> Option<&Arc<dyn Datasource>> {
        self.datasource.as_ref()
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn strategy(&self) -> &TransformStrategy {
        &self.strategy
    }

    pub fn simplify_distance(&self) -> f64 {
        self.simplify_distance
    }

    pub fn target_buffered_extent(&self) -> &GeoBox {
        &self.target_buffered_extent
    }

    pub fn source_buffered_extent(&self) -> &GeoBox {
        &self.source_buffered_extent
    }

    /// Evaluate a feature against the cached active rules.
    ///
    /// A feature passes when any if-rule filter matches, or when a style
    /// carries active else-rules.
    pub fn evaluate_feature(&self, feature: &Feature) -> bool {
        for cache in &self.active_rules {
            for rule in &cache.if_rules {
                if rule.filter.as_ref().is_none_or(|f| f(feature)) {
                    return true;
                }
            }
            if !cache.else_rules.is_empty() {
                return true;
            }
        }
        false
    }
}

fn calc_extent(
    datasource: &Option<Arc<dyn Datasource>>,
    tile_size: u32,
    name: &str,
    valid: &mut bool,
) -> u32 {
    let Some(ds) = datasource else {
        log::debug!("layer '{}': no datasource", name);
        *valid = false;
        return DEFAULT_LAYER_EXTENT;
    };
    let mut extent = ds.layer_extent().unwrap_or(tile_size);
    if extent == 0 {
        log::debug!("layer '{}': zero extent", name);
        *valid = false;
        extent = DEFAULT_LAYER_EXTENT;
    }
    extent
}

fn calc_target_buffered_extent(
    tile_extent: &GeoBox,
    buffer_size: i32,
    layer: &Layer,
    layer_extent: u32,
    map: &Map,
) -> GeoBox {
    let scale = tile_extent.width() / layer_extent as f64;
    let mut padding = 2.0 * scale;
    if let Some(layer_buffer) = layer.buffer_size {
        padding *= layer_buffer as f64 * (layer_extent as f64 / LEGACY_IMAGE_SIZE);
    } else {
        padding *= buffer_size as f64;
    }
    let mut ext = tile_extent.resized(
        tile_extent.width() + padding,
        tile_extent.height() + padding,
    );
    if let Some(maximum) = &map.maximum_extent {
        ext.clip(maximum);
    }
    ext
}

fn is_active(map: &Map, layer: &Layer, scale_denominator: f64, style_level_filter: bool) -> bool {
    if !layer.visible(scale_denominator) {
        return false;
    }
    if !style_level_filter {
        return true;
    }
    for style_name in &layer.styles {
        let Some(style) = map.find_style(style_name) else {
            continue;
        };
        if !style.active(scale_denominator) {
            continue;
        }
        // A single active rule is enough to declare the layer active.
        if style.rules.iter().any(|r| r.active(scale_denominator)) {
            return true;
        }
    }
    false
}

fn get_active_rules(map: &Map, layer: &Layer, scale_denominator: f64) -> Vec<RuleCache> {
    let mut caches = Vec::new();
    for style_name in &layer.styles {
        let Some(style) = map.find_style(style_name) else {
            continue;
        };
        if !style.active(scale_denominator) {
            continue;
        }
        let mut cache = RuleCache::default();
        for rule in &style.rules {
            if rule.active(scale_denominator) {
                if rule.is_else {
                    cache.else_rules.push(rule.clone());
                } else {
                    cache.if_rules.push(rule.clone());
                }
            }
        }
        if !cache.if_rules.is_empty() || !cache.else_rules.is_empty() {
            caches.push(cache);
        }
    }
    caches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PropertyValue;
    use crate::mercator::merc_extent;
    use crate::model::{MemoryDatasource, Reprojection, Style};
    use geo::{point, Coord, Geometry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn merc_point_feature(x: f64, y: f64) -> Feature {
        Feature::new(Geometry::Point(point!(x: x, y: y)))
    }

    fn simple_map(features: Vec<Feature>) -> Map {
        let mut map = Map::new();
        map.add_layer(Layer::new(
            "test",
            Arc::new(MemoryDatasource::new(features)),
        ));
        map
    }

    fn build(map: &Map, layer: &Layer, style_filter: bool) -> Result<LayerContext> {
        LayerContext::new(
            map,
            layer,
            merc_extent(0, 0, 0),
            4096,
            0,
            1,
            1.0,
            0.0,
            0,
            0,
            style_filter,
            0.0,
        )
    }

    #[test]
    fn test_valid_layer() {
        let map = simple_map(vec![merc_point_feature(0.0, 0.0)]);
        let ctx = build(&map, &map.layers[0], false).unwrap();
        assert!(ctx.is_valid());
        assert_eq!(ctx.layer_extent(), 4096);
        assert!(ctx.scale_denominator() > 0.0);
    }

    #[test]
    fn test_layer_without_datasource_invalid() {
        let mut layer = Layer::new("empty", Arc::new(MemoryDatasource::default()));
        layer.datasource = None;
        let map = Map::new();
        let ctx = build(&map, &layer, false).unwrap();
        assert!(!ctx.is_valid());
        assert_eq!(ctx.layer_extent(), 4096);
    }

    #[test]
    fn test_datasource_extent_override() {
        let ds = MemoryDatasource::new(vec![merc_point_feature(0.0, 0.0)]).with_layer_extent(512);
        let layer = Layer::new("coarse", Arc::new(ds));
        let map = Map::new();
        let ctx = build(&map, &layer, false).unwrap();
        assert_eq!(ctx.layer_extent(), 512);
    }

    #[test]
    fn test_visibility_scale_window_invalidates() {
        let map = simple_map(vec![merc_point_feature(0.0, 0.0)]);
        let mut layer = map.layers[0].clone();
        // A z0 world tile has a scale denominator in the hundreds of
        // millions; cap the layer far below that.
        layer.maximum_scale_denominator = 1_000.0;
        let ctx = build(&map, &layer, false).unwrap();
        assert!(!ctx.is_valid());
    }

    #[test]
    fn test_disjoint_extent_invalidates() {
        // Features far outside the z2 tile at (0, 0).
        let map = simple_map(vec![merc_point_feature(10_000_000.0, -10_000_000.0)]);
        let ctx = LayerContext::new(
            &map,
            &map.layers[0],
            merc_extent(0, 0, 2),
            4096,
            0,
            1,
            1.0,
            0.0,
            0,
            0,
            false,
            0.0,
        )
        .unwrap();
        assert!(!ctx.is_valid());
    }

    #[test]
    fn test_buffered_extent_padding() {
        let map = simple_map(vec![merc_point_feature(0.0, 0.0)]);
        let tile_extent = merc_extent(0, 0, 0);
        let ctx = LayerContext::new(
            &map,
            &map.layers[0],
            tile_extent,
            4096,
            64,
            1,
            1.0,
            0.0,
            0,
            0,
            false,
            0.0,
        )
        .unwrap();
        let expected_padding = 2.0 * (tile_extent.width() / 4096.0) * 64.0;
        let buffered = ctx.target_buffered_extent();
        assert!((buffered.width() - (tile_extent.width() + expected_padding)).abs() < 1e-6);
    }

    #[test]
    fn test_maximum_extent_clamps_buffered_extent() {
        let mut map = simple_map(vec![merc_point_feature(0.0, 0.0)]);
        let tile_extent = merc_extent(0, 0, 0);
        map.maximum_extent = Some(tile_extent);
        let ctx = LayerContext::new(
            &map,
            &map.layers[0],
            tile_extent,
            4096,
            64,
            1,
            1.0,
            0.0,
            0,
            0,
            false,
            0.0,
        )
        .unwrap();
        assert_eq!(*ctx.target_buffered_extent(), tile_extent);
    }

    #[test]
    fn test_style_level_filter_requires_active_rule() {
        let mut map = Map::new();
        map.add_style(
            "s",
            Style {
                rules: vec![Rule {
                    max_scale_denominator: 1_000.0,
                    ..Default::default()
                }],
            },
        );
        let ds = Arc::new(MemoryDatasource::new(vec![merc_point_feature(0.0, 0.0)]));
        map.add_layer(Layer::new("styled", ds).with_style("s"));

        // Without the filter the layer is valid even though no rule is
        // active at this scale.
        let ctx = build(&map, &map.layers[0], false).unwrap();
        assert!(ctx.is_valid());

        let ctx = build(&map, &map.layers[0], true).unwrap();
        assert!(!ctx.is_valid());
    }

    #[test]
    fn test_evaluate_feature_rules() {
        let mut map = Map::new();
        map.add_style(
            "s",
            Style {
                rules: vec![Rule {
                    filter: Some(Arc::new(|f: &Feature| {
                        f.properties
                            .iter()
                            .any(|(k, v)| k == "kind" && *v == PropertyValue::Int(1))
                    })),
                    ..Default::default()
                }],
            },
        );
        let ds = Arc::new(MemoryDatasource::new(vec![merc_point_feature(0.0, 0.0)]));
        map.add_layer(Layer::new("styled", ds).with_style("s"));

        let ctx = build(&map, &map.layers[0], true).unwrap();
        assert!(ctx.is_valid());

        let mut matching = merc_point_feature(0.0, 0.0);
        matching
            .properties
            .push(("kind".to_string(), PropertyValue::Int(1)));
        assert!(ctx.evaluate_feature(&matching));

        let other = merc_point_feature(0.0, 0.0);
        assert!(!ctx.evaluate_feature(&other));
    }

    /// Reprojection whose map-to-layer box transform shifts the first box
    /// it sees and refuses every later one. Exercises the fatal fallback
    /// branch deterministically.
    struct FlakyProjection {
        boxes: AtomicUsize,
    }

    impl Reprojection for FlakyProjection {
        fn layer_to_map(&self, c: Coord<f64>) -> Option<Coord<f64>> {
            Some(c)
        }

        fn map_to_layer(&self, c: Coord<f64>) -> Option<Coord<f64>> {
            Some(c)
        }

        fn map_to_layer_box(&self, b: &GeoBox) -> Option<GeoBox> {
            if self.boxes.fetch_add(1, Ordering::SeqCst) == 0 {
                Some(GeoBox::new(
                    b.min_x + 1.0e9,
                    b.min_y + 1.0e9,
                    b.max_x + 1.0e9,
                    b.max_y + 1.0e9,
                ))
            } else {
                None
            }
        }

        fn layer_to_map_box(&self, b: &GeoBox) -> Option<GeoBox> {
            Some(*b)
        }
    }

    #[test]
    fn test_reprojection_failure_on_intersecting_path_is_fatal() {
        let ds = Arc::new(MemoryDatasource::new(vec![merc_point_feature(0.0, 0.0)]));
        let layer = Layer::new("flaky", ds).with_reprojection(Arc::new(FlakyProjection {
            boxes: AtomicUsize::new(0),
        }));
        let map = Map::new();
        let result = build(&map, &layer, false);
        assert!(matches!(result, Err(Error::Reprojection { .. })));
    }

    /// Reprojection that cannot map anything, standing in for a tile box
    /// outside the layer projection's domain of validity.
    struct BrokenProjection;

    impl Reprojection for BrokenProjection {
        fn layer_to_map(&self, _c: Coord<f64>) -> Option<Coord<f64>> {
            None
        }

        fn map_to_layer(&self, _c: Coord<f64>) -> Option<Coord<f64>> {
            None
        }
    }

    #[test]
    fn test_out_of_bounds_projection_invalidates() {
        let ds = Arc::new(MemoryDatasource::new(vec![merc_point_feature(0.0, 0.0)]));
        let layer = Layer::new("utm", ds).with_reprojection(Arc::new(BrokenProjection));
        let map = Map::new();
        let ctx = build(&map, &layer, false).unwrap();
        assert!(!ctx.is_valid());
    }
}
