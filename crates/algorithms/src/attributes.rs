//! Attribute fields computed from geometry

use geo::{Area, Geometry};
use hrudel_core::vector::{AttributeValue, FeatureCollection, FieldDef, FieldType};
use hrudel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Name of the area field in square kilometres
pub const AREAKM2: &str = "AREAKM2";

/// Square metres to square kilometres
pub const M2_TO_KM2: f64 = 1e-6;

/// Definition of a computed area field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub required: bool,
    /// Multiplier from squared CRS units to the stored unit
    pub area_scale: f64,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            name: AREAKM2.to_string(),
            field_type: FieldType::Double,
            nullable: true,
            required: false,
            area_scale: M2_TO_KM2,
        }
    }
}

impl FieldSpec {
    fn definition(&self) -> FieldDef {
        FieldDef {
            name: self.name.clone(),
            field_type: self.field_type,
            nullable: self.nullable,
            required: self.required,
        }
    }
}

/// Unsigned planar area of an areal geometry, 0 for anything else
pub fn planar_area(geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Polygon(p) => p.unsigned_area(),
        Geometry::MultiPolygon(mp) => mp.unsigned_area(),
        Geometry::Rect(r) => r.unsigned_area(),
        Geometry::Triangle(t) => t.unsigned_area(),
        _ => 0.0,
    }
}

/// Add an empty field to the collection.
///
/// An existing field with the same name (case-insensitive) is a
/// [`Error::DuplicateField`] unless `overwrite` is set, in which case the
/// old field and its values are dropped first.
pub fn add_field(collection: &mut FeatureCollection, spec: &FieldSpec, overwrite: bool) -> Result<()> {
    if spec.field_type != FieldType::Double {
        return Err(Error::InvalidParameter {
            name: "field_type",
            value: format!("{:?}", spec.field_type),
            reason: "area fields must be Double".into(),
        });
    }

    if collection.has_field(&spec.name) {
        if !overwrite {
            return Err(Error::DuplicateField(spec.name.clone()));
        }
        debug!("Replacing existing field {}", spec.name);
        collection.remove_field(&spec.name);
    }

    collection.push_field(spec.definition());
    Ok(())
}

/// Fill `spec.name` with each feature's planar area times `spec.area_scale`.
///
/// The field must already exist. Features without geometry get a null.
pub fn calculate_area(collection: &mut FeatureCollection, spec: &FieldSpec) -> Result<()> {
    let name = collection
        .field(&spec.name)
        .map(|f| f.name.clone())
        .ok_or_else(|| Error::geoprocessing("calculate_area", format!("field {} not found", spec.name)))?;

    if collection.crs().is_some_and(|crs| crs.is_geographic()) {
        warn!("Layer has a geographic CRS; {} is computed in squared degrees", name);
    }

    let mut missing = 0usize;
    for feature in collection.iter_mut() {
        let value = match &feature.geometry {
            Some(geometry) => AttributeValue::Float(planar_area(geometry) * spec.area_scale),
            None => {
                missing += 1;
                AttributeValue::Null
            }
        };
        feature.set_property(name.clone(), value);
    }

    if missing > 0 && !spec.nullable {
        return Err(Error::geoprocessing(
            "calculate_area",
            format!("{missing} features have no geometry and {name} is not nullable"),
        ));
    }

    info!("Calculated {} for {} features", name, collection.len());
    Ok(())
}

/// Add and populate an area field in one step
pub fn add_area_field(collection: &mut FeatureCollection, spec: &FieldSpec, overwrite: bool) -> Result<()> {
    add_field(collection, spec, overwrite)?;
    calculate_area(collection, spec)
}
