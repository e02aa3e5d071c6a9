//! Positional-digit encoding of five factor rasters into one HRU code
//!
//! Each factor owns a block of decimal digits in the combined code:
//!
//! ```text
//! code = watershed * 10^8 + grid * 10^5 + elevation * 10^3 + landcover * 10 + radiation
//!
//!        WWW GGG EE LL R
//! ```
//!
//! A factor value outside its block would bleed into the neighbouring
//! factor's digits, so every value is checked before it is combined.

use crate::maybe_rayon::*;
use hrudel_core::raster::Raster;
use hrudel_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Output no-data value of the encoded raster
pub const HRU_NODATA: i64 = i64::MIN;

/// The five input layers, in encoding order (most significant first)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    Watershed,
    Grid,
    Elevation,
    LandCover,
    Radiation,
}

impl Factor {
    pub const ALL: [Factor; 5] = [
        Factor::Watershed,
        Factor::Grid,
        Factor::Elevation,
        Factor::LandCover,
        Factor::Radiation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Factor::Watershed => "watershed",
            Factor::Grid => "grid",
            Factor::Elevation => "elevation",
            Factor::LandCover => "landcover",
            Factor::Radiation => "radiation",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decimal digit block reserved for one factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitBlock {
    /// Place value of the block's lowest digit
    pub multiplier: i64,
    /// Exclusive upper bound on the factor value
    pub limit: i64,
}

impl DigitBlock {
    pub const fn new(multiplier: i64, limit: i64) -> Self {
        Self { multiplier, limit }
    }
}

/// Encoding layout and alignment tolerance.
///
/// The default layout is the classic `WWW GGG EE LL R` split: three digits
/// for watershed and grid, two for elevation and land cover, one for
/// radiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub watershed: DigitBlock,
    pub grid: DigitBlock,
    pub elevation: DigitBlock,
    pub landcover: DigitBlock,
    pub radiation: DigitBlock,
    /// Allowed difference in origin and cell size between layers,
    /// relative to the cell size
    pub alignment_tolerance: f64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            watershed: DigitBlock::new(100_000_000, 1_000),
            grid: DigitBlock::new(100_000, 1_000),
            elevation: DigitBlock::new(1_000, 100),
            landcover: DigitBlock::new(10, 100),
            radiation: DigitBlock::new(1, 10),
            alignment_tolerance: 1e-9,
        }
    }
}

impl EncodingConfig {
    pub fn block(&self, factor: Factor) -> DigitBlock {
        match factor {
            Factor::Watershed => self.watershed,
            Factor::Grid => self.grid,
            Factor::Elevation => self.elevation,
            Factor::LandCover => self.landcover,
            Factor::Radiation => self.radiation,
        }
    }

    /// Check that the digit blocks are disjoint and the largest code fits
    /// in an `i64` that survives a round trip through `f64`.
    pub fn validate(&self) -> Result<()> {
        let blocks: Vec<(Factor, DigitBlock)> = Factor::ALL.iter().map(|&f| (f, self.block(f))).collect();

        for (factor, block) in &blocks {
            if block.multiplier <= 0 || block.limit <= 0 {
                return Err(Error::InvalidParameter {
                    name: "encoding",
                    value: format!("{factor}: {block:?}"),
                    reason: "multiplier and limit must be positive".into(),
                });
            }
        }

        // Factor::ALL runs from the most to the least significant block
        for pair in blocks.windows(2) {
            let (upper, lower) = (pair[0], pair[1]);
            let span = lower.1.limit.checked_mul(lower.1.multiplier);
            if span.map_or(true, |s| s > upper.1.multiplier) {
                return Err(Error::InvalidParameter {
                    name: "encoding",
                    value: format!("{} x{} < {}", lower.0, lower.1.multiplier, lower.1.limit),
                    reason: format!("overlaps the digits of {}", upper.0),
                });
            }
        }

        let top = self.watershed;
        let max_code = top.limit.checked_mul(top.multiplier);
        if max_code.map_or(true, |m| m > (1i64 << 53)) {
            return Err(Error::InvalidParameter {
                name: "encoding",
                value: format!("watershed x{} < {}", top.multiplier, top.limit),
                reason: "largest code exceeds 2^53".into(),
            });
        }

        Ok(())
    }

    /// Combine five in-range factor values into a code
    pub fn encode(&self, values: [i64; 5]) -> i64 {
        Factor::ALL
            .iter()
            .zip(values)
            .map(|(&f, v)| v * self.block(f).multiplier)
            .sum()
    }

    /// Split a code back into its five factor values
    pub fn decode(&self, code: i64) -> HruCode {
        let digits = |f: Factor| {
            let block = self.block(f);
            let v = code / block.multiplier;
            if f == Factor::Watershed { v } else { v % block.limit }
        };
        HruCode {
            watershed: digits(Factor::Watershed),
            grid: digits(Factor::Grid),
            elevation: digits(Factor::Elevation),
            landcover: digits(Factor::LandCover),
            radiation: digits(Factor::Radiation),
        }
    }
}

/// A decoded HRU code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HruCode {
    pub watershed: i64,
    pub grid: i64,
    pub elevation: i64,
    pub landcover: i64,
    pub radiation: i64,
}

/// Decode with the default layout
pub fn decode_hru(code: i64) -> HruCode {
    EncodingConfig::default().decode(code)
}

/// The five factor rasters
#[derive(Debug, Clone)]
pub struct HruLayers {
    pub watershed: Raster<f64>,
    pub grid: Raster<f64>,
    pub elevation: Raster<f64>,
    pub landcover: Raster<f64>,
    pub radiation: Raster<f64>,
}

impl HruLayers {
    pub fn layer(&self, factor: Factor) -> &Raster<f64> {
        match factor {
            Factor::Watershed => &self.watershed,
            Factor::Grid => &self.grid,
            Factor::Elevation => &self.elevation,
            Factor::LandCover => &self.landcover,
            Factor::Radiation => &self.radiation,
        }
    }
}

/// Verify every layer shares the watershed layer's shape, transform and CRS.
pub fn check_alignment(layers: &HruLayers, tolerance: f64) -> Result<()> {
    let reference = &layers.watershed;

    for factor in &Factor::ALL[1..] {
        let layer = layers.layer(*factor);
        let misaligned = |reason: String| Error::MisalignedGrid {
            layer: factor.name().to_string(),
            reason,
        };

        if layer.shape() != reference.shape() {
            return Err(misaligned(format!(
                "is {}x{} cells, watershed is {}x{}",
                layer.rows(),
                layer.cols(),
                reference.rows(),
                reference.cols()
            )));
        }

        let (a, b) = (reference.transform(), layer.transform());
        if !a.is_aligned_with(b, tolerance) {
            let reason = if (a.pixel_width - b.pixel_width).abs() > tolerance * a.cell_size()
                || (a.pixel_height - b.pixel_height).abs() > tolerance * a.cell_size()
            {
                format!(
                    "has cell size {}x{}, watershed has {}x{}",
                    b.pixel_width, b.pixel_height, a.pixel_width, a.pixel_height
                )
            } else {
                format!(
                    "has origin ({}, {}), watershed has ({}, {})",
                    b.origin_x, b.origin_y, a.origin_x, a.origin_y
                )
            };
            return Err(misaligned(reason));
        }

        if let (Some(ca), Some(cb)) = (reference.crs(), layer.crs()) {
            if !ca.is_equivalent(cb) {
                return Err(misaligned(format!("is in {}, watershed is in {}", cb, ca)));
            }
        }
    }

    Ok(())
}

/// Validate one factor value and convert it to an integer.
///
/// `None` means no-data.
fn factor_value(layer: &Raster<f64>, factor: Factor, block: DigitBlock, row: usize, col: usize) -> Result<Option<i64>> {
    let v = layer.data()[(row, col)];
    if layer.is_nodata(v) {
        return Ok(None);
    }
    if !v.is_finite() || v.fract() != 0.0 || v < 0.0 || v >= block.limit as f64 {
        return Err(Error::EncodingRange {
            layer: factor.name().to_string(),
            row,
            col,
            value: v,
            limit: block.limit,
        });
    }
    Ok(Some(v as i64))
}

/// Combine the five factor rasters into one HRU code raster.
///
/// Alignment is checked before any cell is touched. A no-data cell in any
/// layer yields [`HRU_NODATA`]. The output inherits the watershed layer's
/// transform and CRS.
pub fn encode_hru(layers: &HruLayers, config: &EncodingConfig) -> Result<Raster<i64>> {
    config.validate()?;
    check_alignment(layers, config.alignment_tolerance)?;

    let (rows, cols) = layers.watershed.shape();
    info!("Encoding {} x {} cells from 5 layers", cols, rows);

    let row_results: Vec<Result<Vec<i64>>> = (0..rows)
        .into_par_iter()
        .map(|row| -> Result<Vec<i64>> {
            let mut out = vec![HRU_NODATA; cols];
            'cells: for (col, cell) in out.iter_mut().enumerate() {
                let mut values = [0i64; 5];
                for (slot, &factor) in values.iter_mut().zip(Factor::ALL.iter()) {
                    let layer = layers.layer(factor);
                    match factor_value(layer, factor, config.block(factor), row, col)? {
                        Some(v) => *slot = v,
                        None => continue 'cells,
                    }
                }
                *cell = config.encode(values);
            }
            Ok(out)
        })
        .collect();

    let mut data = Vec::with_capacity(rows * cols);
    for row in row_results {
        data.extend(row?);
    }

    let mut output: Raster<i64> = layers.watershed.with_same_meta();
    *output.data_mut() = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    output.set_nodata(Some(HRU_NODATA));

    debug!("Encoded {} valid cells", output.valid_count());
    Ok(output)
}

/// HRU encoder as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct HruEncoder;

impl Algorithm for HruEncoder {
    type Input = HruLayers;
    type Output = Raster<i64>;
    type Params = EncodingConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "HruEncoder"
    }

    fn description(&self) -> &'static str {
        "Combine watershed, grid, elevation, land cover and radiation into one HRU code"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        encode_hru(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrudel_core::{GeoTransform, CRS};

    fn constant(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(3, 3, value);
        r.set_transform(GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        r
    }

    fn layers(w: f64, g: f64, e: f64, l: f64, r: f64) -> HruLayers {
        HruLayers {
            watershed: constant(w),
            grid: constant(g),
            elevation: constant(e),
            landcover: constant(l),
            radiation: constant(r),
        }
    }

    #[test]
    fn test_constant_layers_encode_to_expected_code() {
        let out = encode_hru(&layers(1.0, 2.0, 3.0, 4.0, 5.0), &EncodingConfig::default()).unwrap();
        assert_eq!(out.shape(), (3, 3));
        assert!(out.data().iter().all(|&c| c == 100_203_045));
        assert_eq!(out.transform(), &GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        assert_eq!(out.nodata(), Some(HRU_NODATA));
    }

    #[test]
    fn test_decode_recovers_factors() {
        let config = EncodingConfig::default();
        for values in [[1, 2, 3, 4, 5], [999, 999, 99, 99, 9], [0, 0, 0, 0, 0], [12, 345, 6, 78, 9]] {
            let code = config.encode(values);
            let decoded = config.decode(code);
            assert_eq!(
                [decoded.watershed, decoded.grid, decoded.elevation, decoded.landcover, decoded.radiation],
                values
            );
        }
        assert_eq!(decode_hru(100_203_045).landcover, 4);
    }

    #[test]
    fn test_out_of_range_factor_is_rejected() {
        let err = encode_hru(&layers(1.0, 2.0, 100.0, 4.0, 5.0), &EncodingConfig::default()).unwrap_err();
        match err {
            Error::EncodingRange { layer, value, limit, .. } => {
                assert_eq!(layer, "elevation");
                assert_eq!(value, 100.0);
                assert_eq!(limit, 100);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let radiation = encode_hru(&layers(1.0, 2.0, 3.0, 4.0, 10.0), &EncodingConfig::default());
        assert!(matches!(radiation, Err(Error::EncodingRange { .. })));
    }

    #[test]
    fn test_negative_and_fractional_values_are_rejected() {
        let negative = encode_hru(&layers(-1.0, 2.0, 3.0, 4.0, 5.0), &EncodingConfig::default());
        assert!(matches!(negative, Err(Error::EncodingRange { .. })));

        let fractional = encode_hru(&layers(1.0, 2.5, 3.0, 4.0, 5.0), &EncodingConfig::default());
        assert!(matches!(fractional, Err(Error::EncodingRange { .. })));
    }

    #[test]
    fn test_nodata_in_any_layer_propagates() {
        let mut input = layers(1.0, 2.0, 3.0, 4.0, 5.0);
        input.landcover.set(1, 1, -9999.0).unwrap();
        input.landcover.set_nodata(Some(-9999.0));
        input.radiation.set(0, 2, f64::NAN).unwrap();

        let out = encode_hru(&input, &EncodingConfig::default()).unwrap();
        assert_eq!(out.get(1, 1).unwrap(), HRU_NODATA);
        assert_eq!(out.get(0, 2).unwrap(), HRU_NODATA);
        assert_eq!(out.get(0, 0).unwrap(), 100_203_045);
        assert_eq!(out.valid_count(), 7);
    }

    #[test]
    fn test_misaligned_cell_size() {
        let mut input = layers(1.0, 2.0, 3.0, 4.0, 5.0);
        input.grid.set_transform(GeoTransform::new(0.0, 90.0, 25.0, -25.0));

        match encode_hru(&input, &EncodingConfig::default()).unwrap_err() {
            Error::MisalignedGrid { layer, reason } => {
                assert_eq!(layer, "grid");
                assert!(reason.contains("cell size"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_misaligned_shape_and_crs() {
        let mut input = layers(1.0, 2.0, 3.0, 4.0, 5.0);
        input.radiation = Raster::filled(4, 3, 5.0);
        assert!(matches!(
            check_alignment(&input, 1e-9),
            Err(Error::MisalignedGrid { .. })
        ));

        let mut input = layers(1.0, 2.0, 3.0, 4.0, 5.0);
        input.watershed.set_crs(Some(CRS::from_epsg(3402)));
        input.elevation.set_crs(Some(CRS::from_epsg(32612)));
        assert!(matches!(
            check_alignment(&input, 1e-9),
            Err(Error::MisalignedGrid { layer, .. }) if layer == "elevation"
        ));
    }

    #[test]
    fn test_overlapping_layout_is_invalid() {
        let config = EncodingConfig {
            landcover: DigitBlock::new(10, 1_000),
            ..EncodingConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { .. })));
        assert!(EncodingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_algorithm_trait() {
        let out = HruEncoder.execute_default(layers(7.0, 0.0, 12.0, 3.0, 1.0)).unwrap();
        assert_eq!(out.get(2, 2).unwrap(), 700_012_031);
        assert_eq!(HruEncoder.name(), "HruEncoder");
    }
}
