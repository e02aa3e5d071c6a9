//! Vector data structures: attributed features and their field schema

use crate::crs::CRS;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Integer view of the value.
    ///
    /// Floats holding an exact integer are accepted, since dBASE numeric
    /// columns come back as floating point.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Some(*v as i64),
            _ => None,
        }
    }

    /// Floating point view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// Storage type of an attribute field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Whole numbers, stored as dBASE numeric with no decimals
    Integer,
    /// Double precision, stored as dBASE numeric with decimals
    Double,
    /// Fixed-width text
    Text,
}

/// Definition of one attribute column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            required: false,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            properties: HashMap::new(),
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Builder-style variant of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one field schema and spatial reference.
///
/// The schema is ordered; it becomes the column order of the attribute
/// table when the collection is written.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    fields: Vec<FieldDef>,
    crs: Option<CRS>,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection with the given schema
    pub fn with_fields(fields: Vec<FieldDef>) -> Self {
        Self {
            fields,
            crs: None,
            features: Vec::new(),
        }
    }

    /// Spatial reference of every geometry in the collection
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// The ordered field schema
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field definition by name (dBASE names are case-insensitive)
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Append a field to the schema. Existing features get a null value.
    ///
    /// Returns `false` without changes when a field with that name exists.
    pub fn push_field(&mut self, field: FieldDef) -> bool {
        if self.has_field(&field.name) {
            return false;
        }
        for feature in &mut self.features {
            feature.set_property(field.name.clone(), AttributeValue::Null);
        }
        self.fields.push(field);
        true
    }

    /// Remove a field and its values. Returns the removed definition.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldDef> {
        let idx = self
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))?;
        let removed = self.fields.remove(idx);
        for feature in &mut self.features {
            feature.properties.remove(&removed.name);
        }
        Some(removed)
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.features.iter_mut()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Polygon};

    fn unit_square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    #[test]
    fn test_float_attribute_as_integer() {
        assert_eq!(AttributeValue::Float(100203045.0).as_i64(), Some(100203045));
        assert_eq!(AttributeValue::Float(1.5).as_i64(), None);
        assert_eq!(AttributeValue::Null.as_i64(), None);
        assert_eq!(AttributeValue::Int(7).as_f64(), Some(7.0));
    }

    #[test]
    fn test_push_field_backfills_nulls() {
        let mut fc = FeatureCollection::with_fields(vec![FieldDef::new("GRIDCODE", FieldType::Integer)]);
        fc.push(Feature::new(unit_square()).with_property("GRIDCODE", AttributeValue::Int(1)));

        assert!(fc.push_field(FieldDef::new("AREAKM2", FieldType::Double)));
        assert_eq!(fc.features[0].get_property("AREAKM2"), Some(&AttributeValue::Null));
        assert!(!fc.push_field(FieldDef::new("areakm2", FieldType::Double)));
        assert_eq!(fc.fields().len(), 2);
    }

    #[test]
    fn test_remove_field_drops_values() {
        let mut fc = FeatureCollection::with_fields(vec![FieldDef::new("AREAKM2", FieldType::Double)]);
        fc.push(Feature::new(unit_square()).with_property("AREAKM2", AttributeValue::Float(1.0)));

        let removed = fc.remove_field("AREAKM2").unwrap();
        assert_eq!(removed.field_type, FieldType::Double);
        assert!(fc.features[0].get_property("AREAKM2").is_none());
        assert!(fc.remove_field("AREAKM2").is_none());
    }
}
