//! I/O operations for reading and writing geospatial data

mod geotiff;
mod shp;

pub use geotiff::{read_geotiff, write_geotiff, GeoTiffOptions, SampleFormat};
pub use shp::{projection_path, read_shapefile, shapefile_components, write_shapefile, SHAPEFILE_EXTENSIONS};
