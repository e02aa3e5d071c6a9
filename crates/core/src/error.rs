//! Error types for hrudel

use thiserror::Error;

/// Main error type for hrudel raster, vector and geoprocessing operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Input rasters do not share extent, cell size or spatial reference
    #[error("Misaligned grid: layer '{layer}' {reason}")]
    MisalignedGrid { layer: String, reason: String },

    /// A factor value does not fit in the decimal digits reserved for it
    #[error(
        "Encoding range error: layer '{layer}' has value {value} at ({row}, {col}), \
         allowed range is 0..{limit} (integers only)"
    )]
    EncodingRange {
        layer: String,
        row: usize,
        col: usize,
        value: f64,
        limit: i64,
    },

    /// Target attribute field already exists and overwrite is disallowed
    #[error("Field '{0}' already exists")]
    DuplicateField(String),

    /// A raster or vector operation failed
    #[error("{operation} failed: {reason}")]
    Geoprocessing {
        operation: &'static str,
        reason: String,
    },

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Shapefile error: {0}")]
    Shapefile(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Geoprocessing`] failure
    pub fn geoprocessing(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::Geoprocessing {
            operation,
            reason: reason.into(),
        }
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

impl From<shapefile::Error> for Error {
    fn from(e: shapefile::Error) -> Self {
        Error::Shapefile(e.to_string())
    }
}

/// Result type alias for hrudel operations
pub type Result<T> = std::result::Result<T, Error>;
