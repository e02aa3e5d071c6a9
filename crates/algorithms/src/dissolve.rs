//! Dissolve polygons sharing an attribute value
//!
//! Features are grouped by an integer key field and each group is merged
//! with a true polygon union, so internal shared edges disappear.

use crate::maybe_rayon::*;
use crate::polygonize::GRIDCODE;
use geo::{BooleanOps, Geometry, MultiPolygon, Polygon};
use hrudel_core::vector::{AttributeValue, Feature, FeatureCollection, FieldDef, FieldType};
use hrudel_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Parameters for dissolve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissolveParams {
    /// Integer field whose equal values are merged
    pub field: String,
    /// Keep one (possibly multipart) feature per value. When false,
    /// every disjoint part of a merged group becomes its own feature.
    pub multi_part: bool,
}

impl Default for DissolveParams {
    fn default() -> Self {
        Self {
            field: GRIDCODE.to_string(),
            multi_part: true,
        }
    }
}

fn as_multi(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Ok(mp.clone()),
        other => Err(Error::geoprocessing(
            "dissolve",
            format!("expected polygon geometry, found {}", geometry_kind(other)),
        )),
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "point",
        Geometry::Line(_) => "line",
        Geometry::LineString(_) => "linestring",
        Geometry::Polygon(_) => "polygon",
        Geometry::MultiPoint(_) => "multipoint",
        Geometry::MultiLineString(_) => "multilinestring",
        Geometry::MultiPolygon(_) => "multipolygon",
        Geometry::GeometryCollection(_) => "geometry collection",
        Geometry::Rect(_) => "rect",
        Geometry::Triangle(_) => "triangle",
    }
}

/// Union a group of polygons.
///
/// Pairs are merged level by level so the operands stay similar in size.
fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Read the dissolve key of a feature
fn feature_key(feature: &Feature, field: &str, index: usize) -> Result<i64> {
    match feature.get_property(field) {
        Some(value) => value.as_i64().ok_or_else(|| {
            Error::geoprocessing(
                "dissolve",
                format!("feature {index} has a non-integer {field} value {value:?}"),
            )
        }),
        None => Err(Error::geoprocessing(
            "dissolve",
            format!("feature {index} has no {field} value"),
        )),
    }
}

/// Merge features with equal values of `params.field`.
///
/// The output carries only the dissolve field, ordered by ascending value.
pub fn dissolve(collection: &FeatureCollection, params: &DissolveParams) -> Result<FeatureCollection> {
    let field = collection
        .field(&params.field)
        .map(|f| f.name.clone())
        .ok_or_else(|| Error::geoprocessing("dissolve", format!("field {} not found", params.field)))?;

    let mut groups: BTreeMap<i64, Vec<MultiPolygon<f64>>> = BTreeMap::new();
    for (index, feature) in collection.iter().enumerate() {
        let key = feature_key(feature, &field, index)?;
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| Error::geoprocessing("dissolve", format!("feature {index} has no geometry")))?;
        groups.entry(key).or_default().push(as_multi(geometry)?);
    }

    info!("Dissolving {} features into {} groups", collection.len(), groups.len());

    let merged: Vec<(i64, MultiPolygon<f64>)> = groups
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(key, parts)| {
            let count = parts.len();
            let union = union_all(parts);
            debug!("Group {key}: {count} features -> {} parts", union.0.len());
            (key, union)
        })
        .collect();

    let mut output = FeatureCollection::with_fields(vec![FieldDef::new(&field, FieldType::Integer)]);
    output.set_crs(collection.crs().cloned());

    for (key, union) in merged {
        if union.0.is_empty() {
            return Err(Error::geoprocessing(
                "dissolve",
                format!("union for {field} = {key} is empty"),
            ));
        }
        let value = AttributeValue::Int(key);
        if params.multi_part {
            output.push(Feature::new(single_or_multi(union)).with_property(&field, value));
        } else {
            for part in union {
                output.push(Feature::new(part).with_property(&field, value.clone()));
            }
        }
    }

    Ok(output)
}

fn single_or_multi(mut union: MultiPolygon<f64>) -> Geometry<f64> {
    if union.0.len() == 1 {
        let polygon: Polygon<f64> = union.0.remove(0);
        Geometry::Polygon(polygon)
    } else {
        Geometry::MultiPolygon(union)
    }
}

/// Dissolve as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Dissolve;

impl Algorithm for Dissolve {
    type Input = FeatureCollection;
    type Output = FeatureCollection;
    type Params = DissolveParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Dissolve"
    }

    fn description(&self) -> &'static str {
        "Merge polygons sharing an integer attribute value"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        dissolve(&input, &params)
    }
}
