//! The map model surface consumed by the processor.
//!
//! The surrounding map/style/datasource machinery is not implemented here;
//! this module defines the minimal contract the tiling core needs from it:
//! a [`Map`] with ordered [`Layer`]s, scale-driven [`Style`]/[`Rule`]
//! activity, a [`Datasource`] cursor and a black-box [`Reprojection`].
//!
//! [`MemoryDatasource`] is a small in-process datasource for embedding and
//! tests; real datasources live outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use geo::{BoundingRect, Coord, Geometry};

use crate::bounds::GeoBox;
use crate::encoder::PropertyValue;

/// Number of samples per box edge when reprojecting an envelope.
const ENVELOPE_POINTS: usize = 20;

/// A single map feature in source coordinates.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Optional stable feature id, carried into the encoded tile.
    pub id: Option<u64>,
    /// Geometry in the layer's source projection, double precision.
    pub geometry: Geometry<f64>,
    /// Attribute key/value pairs.
    pub properties: Vec<(String, PropertyValue)>,
}

impl Feature {
    /// Create a feature without id or properties.
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            id: None,
            geometry,
            properties: Vec::new(),
        }
    }

    /// Envelope of the feature geometry in source coordinates.
    pub fn envelope(&self) -> Option<GeoBox> {
        let rect = self.geometry.bounding_rect()?;
        Some(GeoBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }
}

/// A resolution-aware feature query handed to a datasource.
#[derive(Debug, Clone)]
pub struct Query {
    /// Query extent in the layer's source projection.
    pub extent: GeoBox,
    /// Pixels per map unit in x and y.
    pub resolution: (f64, f64),
    /// Effective scale denominator for this request.
    pub scale_denominator: f64,
    /// Attribute names the caller wants materialized.
    pub property_names: Vec<String>,
}

/// A source of features. Implemented by the embedding application.
pub trait Datasource: Send + Sync {
    /// Native envelope of the datasource in its source projection.
    fn envelope(&self) -> Option<GeoBox>;

    /// Cursor over the features matching a query.
    fn features(&self, query: &Query) -> Box<dyn Iterator<Item = Feature> + '_>;

    /// Override for the layer's integer extent, if the source dictates one.
    fn layer_extent(&self) -> Option<u32> {
        None
    }

    /// Names of the attribute fields this source can materialize.
    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Black-box coordinate transform between a layer projection and the map
/// projection. CRS mathematics are out of scope; implementations wrap
/// whatever projection engine the application uses.
pub trait Reprojection: Send + Sync {
    /// Transform a point from layer to map coordinates.
    fn layer_to_map(&self, c: Coord<f64>) -> Option<Coord<f64>>;

    /// Transform a point from map to layer coordinates.
    fn map_to_layer(&self, c: Coord<f64>) -> Option<Coord<f64>>;

    /// Transform an envelope from map to layer coordinates by sampling
    /// densified box edges. `None` if any sample cannot be mapped.
    fn map_to_layer_box(&self, b: &GeoBox) -> Option<GeoBox> {
        transform_box(b, |c| self.map_to_layer(c))
    }

    /// Transform an envelope from layer to map coordinates.
    fn layer_to_map_box(&self, b: &GeoBox) -> Option<GeoBox> {
        transform_box(b, |c| self.layer_to_map(c))
    }
}

fn transform_box<F>(b: &GeoBox, transform: F) -> Option<GeoBox>
where
    F: Fn(Coord<f64>) -> Option<Coord<f64>>,
{
    let mut out = GeoBox::empty();
    let steps = ENVELOPE_POINTS as f64;
    for i in 0..=ENVELOPE_POINTS {
        let t = i as f64 / steps;
        let x = b.min_x + t * b.width();
        let y = b.min_y + t * b.height();
        for c in [
            Coord { x, y: b.min_y },
            Coord { x, y: b.max_y },
            Coord { x: b.min_x, y },
            Coord { x: b.max_x, y },
        ] {
            let p = transform(c)?;
            out.expand_to_include(&GeoBox::new(p.x, p.y, p.x, p.y));
        }
    }
    out.is_valid().then_some(out)
}

/// Predicate evaluated against a feature by a style rule.
pub type RuleFilter = Arc<dyn Fn(&Feature) -> bool + Send + Sync>;

/// A cartographic rule: a scale-denominator activity window plus an
/// optional filter predicate.
#[derive(Clone)]
pub struct Rule {
    pub min_scale_denominator: f64,
    pub max_scale_denominator: f64,
    /// `None` means the rule matches every feature.
    pub filter: Option<RuleFilter>,
    /// Else-rules match when no sibling if-rule matched.
    pub is_else: bool,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            min_scale_denominator: 0.0,
            max_scale_denominator: f64::INFINITY,
            filter: None,
            is_else: false,
        }
    }
}

impl Rule {
    /// Whether the rule is active at the given scale denominator.
    pub fn active(&self, scale_denominator: f64) -> bool {
        scale_denominator >= self.min_scale_denominator
            && scale_denominator < self.max_scale_denominator
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("min_scale_denominator", &self.min_scale_denominator)
            .field("max_scale_denominator", &self.max_scale_denominator)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("is_else", &self.is_else)
            .finish()
    }
}

/// A named style: an ordered list of rules.
#[derive(Debug, Clone, Default)]
pub struct Style {
    pub rules: Vec<Rule>,
}

impl Style {
    /// A style is active when any of its rules is active.
    pub fn active(&self, scale_denominator: f64) -> bool {
        self.rules.iter().any(|r| r.active(scale_denominator))
    }
}

/// A map layer: a datasource plus the metadata the processor consumes.
#[derive(Clone)]
pub struct Layer {
    pub name: String,
    pub datasource: Option<Arc<dyn Datasource>>,
    /// `None` means the layer shares the map projection.
    pub reprojection: Option<Arc<dyn Reprojection>>,
    /// Layer-level buffer override, in legacy 256-pixel image units.
    pub buffer_size: Option<i32>,
    /// Names of the styles attached to this layer.
    pub styles: Vec<String>,
    pub minimum_scale_denominator: f64,
    pub maximum_scale_denominator: f64,
    /// Layer-level simplification distance override.
    pub simplify_distance: Option<f64>,
    pub active: bool,
}

impl Layer {
    /// Create an active layer over a datasource.
    pub fn new(name: impl Into<String>, datasource: Arc<dyn Datasource>) -> Self {
        Self {
            name: name.into(),
            datasource: Some(datasource),
            reprojection: None,
            buffer_size: None,
            styles: Vec::new(),
            minimum_scale_denominator: 0.0,
            maximum_scale_denominator: f64::INFINITY,
            simplify_distance: None,
            active: true,
        }
    }

    /// Set the reprojection from this layer's SRS to the map SRS.
    pub fn with_reprojection(mut self, reprojection: Arc<dyn Reprojection>) -> Self {
        self.reprojection = Some(reprojection);
        self
    }

    /// Attach a style by name.
    pub fn with_style(mut self, name: impl Into<String>) -> Self {
        self.styles.push(name.into());
        self
    }

    /// Whether the layer is visible at the given scale denominator.
    pub fn visible(&self, scale_denominator: f64) -> bool {
        self.active
            && scale_denominator >= self.minimum_scale_denominator
            && scale_denominator < self.maximum_scale_denominator
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("has_datasource", &self.datasource.is_some())
            .field("styles", &self.styles)
            .finish()
    }
}

/// The map: ordered layers, named styles and global constraints.
#[derive(Debug, Clone, Default)]
pub struct Map {
    pub layers: Vec<Layer>,
    pub styles: HashMap<String, Style>,
    /// Optional clamp applied to every buffered query extent.
    pub maximum_extent: Option<GeoBox>,
    /// Whether the map projection is geographic (degree units).
    pub is_geographic: bool,
}

impl Map {
    /// Create an empty Web Mercator map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer; layer order is output order.
    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Register a named style.
    pub fn add_style(&mut self, name: impl Into<String>, style: Style) {
        self.styles.insert(name.into(), style);
    }

    /// Look up a style by name.
    pub fn find_style(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }
}

/// An in-process datasource backed by a feature vector.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatasource {
    features: Vec<Feature>,
    fields: Vec<String>,
    extent_override: Option<u32>,
}

impl MemoryDatasource {
    /// Create a datasource over the given features.
    pub fn new(features: Vec<Feature>) -> Self {
        let mut fields: Vec<String> = Vec::new();
        for f in &features {
            for (k, _) in &f.properties {
                if !fields.contains(k) {
                    fields.push(k.clone());
                }
            }
        }
        Self {
            features,
            fields,
            extent_override: None,
        }
    }

    /// Override the layer extent this source reports.
    pub fn with_layer_extent(mut self, extent: u32) -> Self {
        self.extent_override = Some(extent);
        self
    }
}

impl Datasource for MemoryDatasource {
    fn envelope(&self) -> Option<GeoBox> {
        let mut bounds = GeoBox::empty();
        for f in &self.features {
            if let Some(e) = f.envelope() {
                bounds.expand_to_include(&e);
            }
        }
        bounds.is_valid().then_some(bounds)
    }

    fn features(&self, query: &Query) -> Box<dyn Iterator<Item = Feature> + '_> {
        let extent = query.extent;
        Box::new(
            self.features
                .iter()
                .filter(move |f| match f.envelope() {
                    Some(e) => extent.intersects(&e),
                    None => false,
                })
                .cloned(),
        )
    }

    fn layer_extent(&self) -> Option<u32> {
        self.extent_override
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_rule_activity_window() {
        let rule = Rule {
            min_scale_denominator: 100_000.0,
            max_scale_denominator: 400_000.0,
            ..Default::default()
        };
        assert!(!rule.active(99_999.0));
        assert!(rule.active(100_000.0));
        assert!(rule.active(399_999.0));
        assert!(!rule.active(400_000.0));
    }

    #[test]
    fn test_style_active_when_any_rule_active() {
        let style = Style {
            rules: vec![
                Rule {
                    max_scale_denominator: 10.0,
                    ..Default::default()
                },
                Rule {
                    min_scale_denominator: 1_000.0,
                    ..Default::default()
                },
            ],
        };
        assert!(style.active(5.0));
        assert!(!style.active(500.0));
        assert!(style.active(2_000.0));
    }

    #[test]
    fn test_layer_visibility() {
        let ds = Arc::new(MemoryDatasource::default());
        let mut layer = Layer::new("roads", ds);
        layer.maximum_scale_denominator = 1_000.0;
        assert!(layer.visible(999.0));
        assert!(!layer.visible(1_000.0));

        layer.active = false;
        assert!(!layer.visible(0.0));
    }

    #[test]
    fn test_memory_datasource_query_filters_by_extent() {
        let ds = MemoryDatasource::new(vec![
            Feature::new(Geometry::Point(point!(x: 1.0, y: 1.0))),
            Feature::new(Geometry::Point(point!(x: 50.0, y: 50.0))),
        ]);
        let query = Query {
            extent: GeoBox::new(0.0, 0.0, 10.0, 10.0),
            resolution: (1.0, 1.0),
            scale_denominator: 0.0,
            property_names: vec![],
        };
        assert_eq!(ds.features(&query).count(), 1);
    }

    #[test]
    fn test_memory_datasource_field_names() {
        let ds = MemoryDatasource::new(vec![Feature {
            id: None,
            geometry: Geometry::Point(point!(x: 0.0, y: 0.0)),
            properties: vec![
                ("kind".to_string(), PropertyValue::String("a".to_string())),
                ("rank".to_string(), PropertyValue::Int(1)),
            ],
        }]);
        assert_eq!(ds.field_names(), vec!["kind", "rank"]);
    }
}
