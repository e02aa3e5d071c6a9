//! ESRI shapefile reading/writing for polygon layers
//!
//! A layer is three sibling files (`.shp` geometry, `.shx` index, `.dbf`
//! attributes), plus a `.prj` when the coordinate system is known as WKT.
//! Field order in the `.dbf` follows the collection schema.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection, FieldDef, FieldType};
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use shapefile::dbase::{self, FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{PolygonRing, Shape};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Width of integer columns; fits codes up to 10^14
const INTEGER_WIDTH: u8 = 15;
/// Width and scale of double columns, as ArcGIS writes DOUBLE to dBASE
const DOUBLE_WIDTH: u8 = 19;
const DOUBLE_DECIMALS: u8 = 11;
const TEXT_WIDTH: u8 = 254;

/// Extensions making up one shapefile layer
pub const SHAPEFILE_EXTENSIONS: [&str; 3] = ["shp", "shx", "dbf"];

/// Paths of every component file of the layer at `path`
pub fn shapefile_components(path: &Path) -> Vec<PathBuf> {
    SHAPEFILE_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .collect()
}

/// Optional sidecar holding the layer's coordinate system as WKT
pub fn projection_path(path: &Path) -> PathBuf {
    path.with_extension("prj")
}

/// Write a polygon feature collection to a shapefile.
///
/// Every feature must carry `Polygon` or `MultiPolygon` geometry.
pub fn write_shapefile<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let mut builder = TableWriterBuilder::new();
    for field in collection.fields() {
        let name = FieldName::try_from(field.name.as_str()).map_err(|_| Error::InvalidParameter {
            name: "field",
            value: field.name.clone(),
            reason: "not a valid dBASE field name".into(),
        })?;
        builder = match field.field_type {
            FieldType::Integer => builder.add_numeric_field(name, INTEGER_WIDTH, 0),
            FieldType::Double => builder.add_numeric_field(name, DOUBLE_WIDTH, DOUBLE_DECIMALS),
            FieldType::Text => builder.add_character_field(name, TEXT_WIDTH),
        };
    }

    let mut writer = shapefile::Writer::from_path(path.as_ref(), builder)?;
    for feature in collection.iter() {
        let record = to_record(collection.fields(), feature);
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| Error::UnsupportedDataType("feature without geometry".into()))?;
        writer.write_shape_and_record(&to_shape_polygon(geometry)?, &record)?;
    }

    write_projection(collection.crs(), path.as_ref())?;
    debug!("Wrote {} features to {}", collection.len(), path.as_ref().display());
    Ok(())
}

fn write_projection(crs: Option<&CRS>, path: &Path) -> Result<()> {
    let Some(crs) = crs else {
        return Ok(());
    };
    match crs.wkt() {
        Some(wkt) => std::fs::write(projection_path(path), wkt)?,
        // Building ESRI WKT from an EPSG code needs a projection database
        None => warn!(
            "{} has CRS {} but no WKT for it; no .prj written",
            path.display(),
            crs.identifier()
        ),
    }
    Ok(())
}

fn to_record(fields: &[FieldDef], feature: &Feature) -> Record {
    let mut record = Record::default();
    for field in fields {
        let value = feature.get_property(&field.name).unwrap_or(&AttributeValue::Null);
        let dbf_value = match (field.field_type, value) {
            (FieldType::Text, AttributeValue::String(s)) => FieldValue::Character(Some(s.clone())),
            (FieldType::Text, _) => FieldValue::Character(None),
            (_, v) => FieldValue::Numeric(v.as_f64()),
        };
        record.insert(field.name.clone(), dbf_value);
    }
    record
}

fn to_shape_polygon(geometry: &Geometry<f64>) -> Result<shapefile::Polygon> {
    let polygons: Vec<&Polygon<f64>> = match geometry {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "shapefile polygon layer cannot store non-polygon geometry".into(),
            ))
        }
    };

    let mut rings = Vec::new();
    for polygon in polygons {
        rings.push(PolygonRing::Outer(to_points(polygon.exterior())));
        for hole in polygon.interiors() {
            rings.push(PolygonRing::Inner(to_points(hole)));
        }
    }
    // with_rings fixes winding: outer clockwise, inner counter-clockwise
    Ok(shapefile::Polygon::with_rings(rings))
}

fn to_points(ring: &LineString<f64>) -> Vec<shapefile::Point> {
    ring.coords().map(|c| shapefile::Point::new(c.x, c.y)).collect()
}

/// Read a polygon shapefile into a feature collection.
///
/// Numeric columns come back as `Double` fields holding floats; use
/// [`AttributeValue::as_i64`] for integer codes.
pub fn read_shapefile<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let table = dbase::Reader::from_path(path.with_extension("dbf"))
        .map_err(|e| Error::Shapefile(e.to_string()))?;
    let fields: Vec<FieldDef> = table
        .fields()
        .iter()
        .map(|info| {
            let field_type = match info.field_type() {
                dbase::FieldType::Character | dbase::FieldType::Memo => FieldType::Text,
                dbase::FieldType::Integer => FieldType::Integer,
                _ => FieldType::Double,
            };
            FieldDef::new(info.name(), field_type)
        })
        .collect();

    let mut collection = FeatureCollection::with_fields(fields);
    let prj = projection_path(path);
    if prj.exists() {
        let wkt = std::fs::read_to_string(&prj)?;
        collection.set_crs(Some(CRS::from_wkt(wkt.trim())));
    }
    let mut reader = shapefile::Reader::from_path(path)?;
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;
        let geometry = match shape {
            Shape::Polygon(polygon) => Some(Geometry::MultiPolygon(from_shape_polygon(&polygon))),
            Shape::NullShape => None,
            other => {
                return Err(Error::UnsupportedDataType(format!(
                    "expected a polygon layer, found {:?}",
                    other.shapetype()
                )))
            }
        };

        let mut feature = Feature {
            geometry,
            properties: Default::default(),
        };
        for field in collection.fields() {
            let value = record.get(&field.name).map(from_field_value).unwrap_or(AttributeValue::Null);
            feature.set_property(field.name.clone(), value);
        }
        collection.push(feature);
    }

    Ok(collection)
}

fn from_field_value(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Numeric(Some(v)) => AttributeValue::Float(*v),
        FieldValue::Float(Some(v)) => AttributeValue::Float(*v as f64),
        FieldValue::Double(v) => AttributeValue::Float(*v),
        FieldValue::Integer(v) => AttributeValue::Int(*v as i64),
        FieldValue::Character(Some(s)) => AttributeValue::String(s.clone()),
        _ => AttributeValue::Null,
    }
}

/// Rebuild polygons from shapefile rings: every outer ring starts a
/// polygon, every inner ring is attached to the smallest outer ring that
/// contains the midpoint of its first edge. Holes may touch their shell at
/// a vertex, so vertices are not reliable probes.
fn from_shape_polygon(polygon: &shapefile::Polygon) -> MultiPolygon<f64> {
    let mut outers: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    let mut inners: Vec<LineString<f64>> = Vec::new();

    for ring in polygon.rings() {
        let line: LineString<f64> = ring
            .points()
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect();
        match ring {
            PolygonRing::Outer(_) => outers.push((line, Vec::new())),
            PolygonRing::Inner(_) => inners.push(line),
        }
    }

    for hole in inners {
        let Some(edge) = hole.lines().next() else {
            continue;
        };
        let probe = Coord {
            x: (edge.start.x + edge.end.x) / 2.0,
            y: (edge.start.y + edge.end.y) / 2.0,
        };
        let owner = outers
            .iter_mut()
            .filter(|(outer, _)| ring_contains(outer, probe))
            .min_by(|(a, _), (b, _)| ring_area(a).total_cmp(&ring_area(b)));
        if let Some((_, holes)) = owner {
            holes.push(hole);
        }
    }

    MultiPolygon::new(
        outers
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}

/// Even-odd point in ring test
fn ring_contains(ring: &LineString<f64>, p: Coord<f64>) -> bool {
    let mut inside = false;
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    ring.lines()
        .map(|l| l.start.x * l.end.y - l.end.x * l.start.y)
        .sum::<f64>()
        .abs()
        / 2.0
}
