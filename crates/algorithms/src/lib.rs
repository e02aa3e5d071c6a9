//! # hrudel algorithms
//!
//! The geoprocessing steps of HRU delineation:
//!
//! - **encoding**: combine five aligned factor rasters into one integer code per cell
//! - **polygonize**: turn 4-connected regions of equal code into polygons
//! - **dissolve**: merge polygons sharing a code
//! - **attributes**: add and compute the area field

pub mod attributes;
pub mod dissolve;
pub mod encoding;
pub mod polygonize;

pub(crate) mod maybe_rayon;

pub use attributes::{add_area_field, add_field, calculate_area, planar_area, FieldSpec, AREAKM2, M2_TO_KM2};
pub use dissolve::{dissolve, Dissolve, DissolveParams};
pub use encoding::{
    check_alignment, decode_hru, encode_hru, DigitBlock, EncodingConfig, Factor, HruCode, HruEncoder, HruLayers,
    HRU_NODATA,
};
pub use polygonize::{polygonize, Polygonize, PolygonizeParams, GRIDCODE};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attributes::{add_area_field, FieldSpec, AREAKM2};
    pub use crate::dissolve::{dissolve, Dissolve, DissolveParams};
    pub use crate::encoding::{decode_hru, encode_hru, EncodingConfig, Factor, HruEncoder, HruLayers};
    pub use crate::polygonize::{polygonize, Polygonize, PolygonizeParams};
    pub use hrudel_core::prelude::*;
}
