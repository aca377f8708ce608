//! `vctr` point-tile encoder.
//!
//! Positions are quantized into the tile rectangle, delta-encoded per axis
//! and zigzag-mapped to unsigned 16 bits so spatially close points produce
//! small values for downstream general-purpose compression. Two JSON
//! side-tables describe the geometry (feature table) and per-point
//! attributes (batch table).
//!
//! Layout: 44-byte little-endian header, padded feature-table JSON, padded
//! batch-table JSON, then the raw coordinate streams (all U deltas, all V,
//! all H).

use bytes::{BufMut, Bytes, BytesMut};
use geo::Rect;
use serde::Serialize;
use serde_json::{Map, Value};

use super::pad_json;
use crate::error::Result;

pub const VCTR_MAGIC: &[u8; 4] = b"vctr";

const VERSION: u32 = 1;
const HEADER_LEN: usize = 44;
const MAX_SHORT: f64 = 32767.0;
/// Fixed height span the H axis is quantized against, in meters.
const MIN_HEIGHT: f64 = 0.0;
const MAX_HEIGHT: f64 = 10_000.0;

/// Geographic rectangle in radians, the quantization frame of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        let (west, south) = (west.to_radians(), south.to_radians());
        let (east, north) = (east.to_radians(), north.to_radians());
        Self {
            west,
            south,
            east,
            north,
            width: east - west,
            height: north - south,
        }
    }

    /// From a tile bounding box in degrees (`min` is the southwest corner).
    pub fn from_rect(rect: &Rect) -> Self {
        Self::from_degrees(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// One point position: longitude/latitude in radians, height in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Cartographic {
    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude.to_radians(),
            latitude: latitude.to_radians(),
            height,
        }
    }
}

/// Named per-point attribute arrays for the batch table, serialized in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct AttributeColumns {
    columns: Vec<(String, Vec<Value>)>,
}

impl AttributeColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; one value per point, in point order.
    pub fn push<V: Into<Value>>(&mut self, name: &str, values: impl IntoIterator<Item = V>) {
        self.columns.push((
            name.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Batch-table JSON with every column aligned to the point count.
    ///
    /// A length mismatch is an internal defect: it is logged and repaired
    /// (truncate or null-pad) rather than aborting, so one malformed tile
    /// cannot take down a serving process.
    fn to_json(&self, point_count: usize) -> Result<String> {
        let mut table = Map::new();
        for (name, values) in &self.columns {
            let mut values = values.clone();
            if values.len() != point_count {
                log::error!(
                    "encode inconsistency: batch column {name} has {} values for {point_count} points",
                    values.len()
                );
                values.resize(point_count, Value::Null);
            }
            table.insert(name.clone(), Value::Array(values));
        }
        Ok(serde_json::to_string(&Value::Object(table))?)
    }
}

#[derive(Serialize)]
struct FeatureTableHeader {
    #[serde(rename = "REGION")]
    region: [f64; 6],
    #[serde(rename = "POINTS_LENGTH")]
    points_length: usize,
}

/// Encode one point tile.
///
/// The output is a single complete buffer; all section lengths in the
/// header are consistent with the emitted bytes.
pub fn encode_tile(
    rectangle: &Rectangle,
    positions: &[Cartographic],
    attributes: &AttributeColumns,
) -> Result<Bytes> {
    let position_buffer = encode_positions(rectangle, MIN_HEIGHT, MAX_HEIGHT, positions);

    let feature_table = FeatureTableHeader {
        region: [
            rectangle.west,
            rectangle.south,
            rectangle.east,
            rectangle.north,
            MIN_HEIGHT,
            MAX_HEIGHT,
        ],
        points_length: positions.len(),
    };
    let feature_json = pad_json(serde_json::to_string(&feature_table)?, 4);
    let batch_json = pad_json(attributes.to_json(positions.len())?, 4);

    let byte_length = HEADER_LEN + position_buffer.len() + feature_json.len() + batch_json.len();

    let mut buf = BytesMut::with_capacity(byte_length);
    buf.put_slice(VCTR_MAGIC);
    buf.put_u32_le(VERSION);
    buf.put_u32_le(byte_length as u32);
    buf.put_u32_le(feature_json.len() as u32);
    buf.put_u32_le(0); // feature table binary, unused
    buf.put_u32_le(batch_json.len() as u32);
    buf.put_u32_le(0); // batch table binary, unused
    buf.put_u32_le(0); // polygon indices
    buf.put_u32_le(0); // polygon positions
    buf.put_u32_le(0); // polyline positions
    buf.put_u32_le(position_buffer.len() as u32);

    buf.put_slice(feature_json.as_bytes());
    buf.put_slice(batch_json.as_bytes());
    buf.put_slice(&position_buffer);

    Ok(buf.freeze())
}

/// Quantize, delta-encode and zigzag the positions into the axis-major
/// little-endian u16 stream.
fn encode_positions(
    rectangle: &Rectangle,
    min_height: f64,
    max_height: f64,
    positions: &[Cartographic],
) -> Vec<u8> {
    let quantize = |value: f64| -> i32 { (value.clamp(0.0, 1.0) * MAX_SHORT).floor() as i32 };

    let mut us = Vec::with_capacity(positions.len());
    let mut vs = Vec::with_capacity(positions.len());
    let mut hs = Vec::with_capacity(positions.len());
    for position in positions {
        us.push(quantize(
            (position.longitude - rectangle.west) / rectangle.width,
        ));
        vs.push(quantize(
            (position.latitude - rectangle.south) / rectangle.height,
        ));
        hs.push(quantize(
            (position.height - min_height) / (max_height - min_height),
        ));
    }

    let mut buf = BytesMut::with_capacity(positions.len() * 6);
    for axis in [&us, &vs, &hs] {
        let mut last = 0;
        for &value in axis.iter() {
            buf.put_u16_le(zigzag(value - last));
            last = value;
        }
    }
    buf.to_vec()
}

/// Map a signed 16-bit delta (carried in i32) to unsigned so either sign
/// compresses as a small magnitude.
fn zigzag(value: i32) -> u16 {
    (((value << 1) ^ (value >> 15)) & 0xffff) as u16
}
