//! Binary feature encoding into the Mapbox Vector Tile wire format.
//!
//! Geometry arrives here already in tile-integer space; commands are
//! delta-encoded against a running cursor:
//!
//! - **Zigzag encoding**: signed deltas packed as small unsigned varints
//! - **Command encoding**: `(command_id | (count << 3))` for
//!   MoveTo (1), LineTo (2) and ClosePath (7)
//! - **Layer building**: features grouped with deduplicated key/value
//!   tables, finalized into a protobuf layer buffer
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec>

use std::collections::HashMap;

use geo::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use prost::Message;

use crate::model::Feature as MapFeature;
use crate::vector_tile::tile::{Feature, GeomType, Layer, Value};
use crate::vector_tile::Tile;
use crate::indexer::GeometrySink;
use crate::{Error, Result};

/// Default tile extent (4096 as per the MVT spec).
pub const DEFAULT_EXTENT: u32 = 4096;

/// MVT command ids.
const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// Encode a signed integer using zigzag encoding.
///
/// Maps signed to unsigned so small magnitudes stay small:
/// 0 → 0, -1 → 1, 1 → 2, -2 → 3, ...
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decode a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Pack a command id with a repeat count.
#[inline]
pub fn command_encode(command_id: u32, count: u32) -> u32 {
    (command_id & 0x7) | (count << 3)
}

/// Unpack a command into (command_id, count).
#[inline]
pub fn command_decode(command: u32) -> (u32, u32) {
    (command & 0x7, command >> 3)
}

/// Running pen position shared across a feature's command stream.
#[derive(Default)]
struct Cursor {
    x: i64,
    y: i64,
}

impl Cursor {
    fn delta_to(&mut self, x: i64, y: i64) -> (u32, u32) {
        let dx = (x - self.x) as i32;
        let dy = (y - self.y) as i32;
        self.x = x;
        self.y = y;
        (zigzag_encode(dx), zigzag_encode(dy))
    }
}

fn encode_point(point: &Point<i64>) -> Vec<u32> {
    let mut cursor = Cursor::default();
    let (dx, dy) = cursor.delta_to(point.0.x, point.0.y);
    vec![command_encode(CMD_MOVE_TO, 1), dx, dy]
}

fn encode_multi_point(points: &MultiPoint<i64>) -> Vec<u32> {
    if points.0.is_empty() {
        return vec![];
    }
    let mut geometry = Vec::with_capacity(1 + points.0.len() * 2);
    let mut cursor = Cursor::default();
    geometry.push(command_encode(CMD_MOVE_TO, points.0.len() as u32));
    for point in &points.0 {
        let (dx, dy) = cursor.delta_to(point.0.x, point.0.y);
        geometry.push(dx);
        geometry.push(dy);
    }
    geometry
}

fn encode_line(line: &LineString<i64>, cursor: &mut Cursor, geometry: &mut Vec<u32>) {
    if line.0.len() < 2 {
        return;
    }
    let first = line.0[0];
    let (dx, dy) = cursor.delta_to(first.x, first.y);
    geometry.push(command_encode(CMD_MOVE_TO, 1));
    geometry.push(dx);
    geometry.push(dy);

    geometry.push(command_encode(CMD_LINE_TO, (line.0.len() - 1) as u32));
    for coord in line.0.iter().skip(1) {
        let (dx, dy) = cursor.delta_to(coord.x, coord.y);
        geometry.push(dx);
        geometry.push(dy);
    }
}

fn encode_linestring(line: &LineString<i64>) -> Vec<u32> {
    let mut geometry = Vec::with_capacity(3 + line.0.len().saturating_sub(1) * 2);
    let mut cursor = Cursor::default();
    encode_line(line, &mut cursor, &mut geometry);
    geometry
}

fn encode_multi_linestring(lines: &MultiLineString<i64>) -> Vec<u32> {
    let mut geometry = Vec::new();
    let mut cursor = Cursor::default();
    for line in &lines.0 {
        encode_line(line, &mut cursor, &mut geometry);
    }
    geometry
}

/// Encode one polygon ring. The closing vertex is implicit via ClosePath.
fn encode_ring(ring: &LineString<i64>, cursor: &mut Cursor, geometry: &mut Vec<u32>) {
    let closed = ring.0.len() > 1 && ring.0.first() == ring.0.last();
    let pts = if closed {
        &ring.0[..ring.0.len() - 1]
    } else {
        &ring.0[..]
    };
    if pts.len() < 3 {
        return;
    }

    let (dx, dy) = cursor.delta_to(pts[0].x, pts[0].y);
    geometry.push(command_encode(CMD_MOVE_TO, 1));
    geometry.push(dx);
    geometry.push(dy);

    geometry.push(command_encode(CMD_LINE_TO, (pts.len() - 1) as u32));
    for coord in &pts[1..] {
        let (dx, dy) = cursor.delta_to(coord.x, coord.y);
        geometry.push(dx);
        geometry.push(dy);
    }
    geometry.push(command_encode(CMD_CLOSE_PATH, 1));
}

fn encode_polygon_rings(polygon: &Polygon<i64>, cursor: &mut Cursor, geometry: &mut Vec<u32>) {
    encode_ring(polygon.exterior(), cursor, geometry);
    for interior in polygon.interiors() {
        encode_ring(interior, cursor, geometry);
    }
}

fn encode_polygon(polygon: &Polygon<i64>) -> Vec<u32> {
    let mut geometry = Vec::new();
    let mut cursor = Cursor::default();
    encode_polygon_rings(polygon, &mut cursor, &mut geometry);
    geometry
}

fn encode_multi_polygon(polygons: &MultiPolygon<i64>) -> Vec<u32> {
    let mut geometry = Vec::new();
    let mut cursor = Cursor::default();
    for polygon in &polygons.0 {
        encode_polygon_rings(polygon, &mut cursor, &mut geometry);
    }
    geometry
}

/// Encode a tile-space geometry into MVT commands plus the geometry type.
pub fn encode_geometry(geom: &Geometry<i64>) -> (Vec<u32>, GeomType) {
    match geom {
        Geometry::Point(p) => (encode_point(p), GeomType::Point),
        Geometry::MultiPoint(mp) => (encode_multi_point(mp), GeomType::Point),
        Geometry::LineString(ls) => (encode_linestring(ls), GeomType::Linestring),
        Geometry::MultiLineString(mls) => (encode_multi_linestring(mls), GeomType::Linestring),
        Geometry::Polygon(p) => (encode_polygon(p), GeomType::Polygon),
        Geometry::MultiPolygon(mp) => (encode_multi_polygon(mp), GeomType::Polygon),
        // Collections are flattened upstream; anything else is unencodable.
        _ => (vec![], GeomType::Unknown),
    }
}

/// A typed feature attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl PropertyValue {
    fn to_mvt_value(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value {
                string_value: Some(s.clone()),
                ..Default::default()
            },
            PropertyValue::Float(f) => Value {
                float_value: Some(*f),
                ..Default::default()
            },
            PropertyValue::Double(d) => Value {
                double_value: Some(*d),
                ..Default::default()
            },
            PropertyValue::Int(i) => Value {
                int_value: Some(*i),
                ..Default::default()
            },
            PropertyValue::UInt(u) => Value {
                uint_value: Some(*u),
                ..Default::default()
            },
            PropertyValue::Bool(b) => Value {
                bool_value: Some(*b),
                ..Default::default()
            },
        }
    }
}

/// A finalized layer: its name, paint state and encoded buffer.
///
/// `data` is `None` for layers that never wrote a feature; the tile
/// records those as explicitly empty.
#[derive(Debug, Clone)]
pub struct EncodedLayer {
    pub name: String,
    pub painted: bool,
    pub data: Option<Vec<u8>>,
}

/// Builder for one in-progress encoded layer.
pub struct LayerBuilder {
    name: String,
    extent: u32,
    features: Vec<Feature>,
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<Value>,
    value_index: HashMap<String, u32>,
    empty: bool,
    painted: bool,
}

impl LayerBuilder {
    /// Create a builder for a named layer with the given extent.
    pub fn new(name: impl Into<String>, extent: u32) -> Self {
        Self {
            name: name.into(),
            extent,
            features: Vec::new(),
            keys: Vec::new(),
            key_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
            empty: true,
            painted: false,
        }
    }

    /// Whether any feature has been written.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Whether any geometry reached this builder.
    pub fn is_painted(&self) -> bool {
        self.painted
    }

    fn get_or_insert_key(&mut self, key: &str) -> u32 {
        if let Some(&idx) = self.key_index.get(key) {
            idx
        } else {
            let idx = self.keys.len() as u32;
            self.keys.push(key.to_string());
            self.key_index.insert(key.to_string(), idx);
            idx
        }
    }

    fn get_or_insert_value(&mut self, value: &PropertyValue) -> u32 {
        // Debug formatting doubles as the deduplication key.
        let value_key = format!("{:?}", value);
        if let Some(&idx) = self.value_index.get(&value_key) {
            idx
        } else {
            let idx = self.values.len() as u32;
            self.values.push(value.to_mvt_value());
            self.value_index.insert(value_key, idx);
            idx
        }
    }

    /// Encode a feature into the layer. Features whose geometry encodes to
    /// nothing are dropped, but still mark the layer painted.
    pub fn add_feature(
        &mut self,
        id: Option<u64>,
        geometry: &Geometry<i64>,
        properties: &[(String, PropertyValue)],
    ) {
        self.painted = true;

        let (geom_commands, geom_type) = encode_geometry(geometry);
        if geom_commands.is_empty() {
            return;
        }

        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            let key_idx = self.get_or_insert_key(key);
            let value_idx = self.get_or_insert_value(value);
            tags.push(key_idx);
            tags.push(value_idx);
        }

        self.features.push(Feature {
            id,
            tags,
            r#type: Some(geom_type as i32),
            geometry: geom_commands,
        });
        self.empty = false;
    }

    /// Finish the layer. Empty layers yield no buffer.
    pub fn finalize(self) -> EncodedLayer {
        if self.empty {
            return EncodedLayer {
                name: self.name,
                painted: self.painted,
                data: None,
            };
        }

        let layer = Layer {
            version: 2,
            name: self.name.clone(),
            features: self.features,
            keys: self.keys,
            values: self.values,
            extent: Some(self.extent),
        };
        // A tile message holding one layer; tile buffers concatenate these
        // per-layer buffers into the full tile (repeated-field semantics).
        let tile = Tile {
            layers: vec![layer],
        };
        EncodedLayer {
            name: self.name,
            painted: self.painted,
            data: Some(tile.encode_to_vec()),
        }
    }
}

/// Terminal pipeline stage: encodes every geometry it receives as one
/// feature of the layer under construction.
pub struct FeatureEncoder<'a> {
    id: Option<u64>,
    properties: &'a [(String, PropertyValue)],
    builder: &'a mut LayerBuilder,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(feature: &'a MapFeature, builder: &'a mut LayerBuilder) -> Self {
        Self {
            id: feature.id,
            properties: &feature.properties,
            builder,
        }
    }
}

impl GeometrySink for FeatureEncoder<'_> {
    fn geometry(&mut self, geom: Geometry<i64>) {
        self.builder.add_feature(self.id, &geom, self.properties);
    }
}

/// Decode an encoded tile buffer back into its protobuf message.
pub fn decode_tile(data: &[u8]) -> Result<Tile> {
    Tile::decode(data).map_err(Error::TileDecode)
}
