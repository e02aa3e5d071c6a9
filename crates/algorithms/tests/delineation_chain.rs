//! In-memory chain of the delineation steps on synthetic factor layers.

use approx::assert_relative_eq;
use hrudel_algorithms::{
    add_area_field, decode_hru, dissolve, encode_hru, polygonize, DissolveParams, EncodingConfig, FieldSpec,
    HruLayers, PolygonizeParams, AREAKM2, GRIDCODE, HRU_NODATA,
};
use hrudel_core::{GeoTransform, Raster, CRS};
use std::collections::BTreeSet;

const CELL: f64 = 30.0;

fn layer(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::new(rows, cols);
    r.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, CELL, -CELL));
    r.set_crs(Some(CRS::from_epsg(32719)));
    for row in 0..rows {
        for col in 0..cols {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r
}

fn synthetic(rows: usize, cols: usize) -> HruLayers {
    HruLayers {
        watershed: layer(rows, cols, |_, c| if c < cols / 2 { 1.0 } else { 2.0 }),
        grid: layer(rows, cols, |r, _| (r / 4) as f64),
        elevation: layer(rows, cols, |r, c| ((r + c) / 3 % 4) as f64),
        landcover: layer(rows, cols, |r, c| ((r * 3 + c) % 5 / 3) as f64),
        radiation: layer(rows, cols, |r, c| if (r / 2 + c / 5) % 2 == 0 { 3.0 } else { 7.0 }),
    }
}

#[test]
fn chain_preserves_area_and_codes() {
    let (rows, cols) = (12, 10);
    let layers = synthetic(rows, cols);
    let coded = encode_hru(&layers, &EncodingConfig::default()).unwrap();

    let distinct: BTreeSet<i64> = coded.data().iter().copied().collect();

    let polygons = polygonize(&coded, &PolygonizeParams::default()).unwrap();
    assert!(polygons.len() >= distinct.len());

    let mut dissolved = dissolve(&polygons, &DissolveParams::default()).unwrap();
    let keys: Vec<i64> = dissolved
        .iter()
        .map(|f| f.get_property(GRIDCODE).unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(keys, distinct.iter().copied().collect::<Vec<_>>());

    add_area_field(&mut dissolved, &FieldSpec::default(), true).unwrap();
    let total_km2: f64 = dissolved
        .iter()
        .map(|f| f.get_property(AREAKM2).unwrap().as_f64().unwrap())
        .sum();
    assert_relative_eq!(total_km2, (rows * cols) as f64 * CELL * CELL / 1e6, max_relative = 1e-9);

    // Every dissolved area matches the cell count of its code
    for feature in dissolved.iter() {
        let code = feature.get_property(GRIDCODE).unwrap().as_i64().unwrap();
        let cells = coded.data().iter().filter(|&&v| v == code).count();
        let km2 = feature.get_property(AREAKM2).unwrap().as_f64().unwrap();
        assert_relative_eq!(km2, cells as f64 * CELL * CELL / 1e6, max_relative = 1e-9);
    }
}

#[test]
fn codes_decode_to_their_factors() {
    let layers = synthetic(8, 8);
    let coded = encode_hru(&layers, &EncodingConfig::default()).unwrap();

    for row in 0..8 {
        for col in 0..8 {
            let hru = decode_hru(coded.get(row, col).unwrap());
            assert_eq!(hru.watershed as f64, layers.watershed.get(row, col).unwrap());
            assert_eq!(hru.grid as f64, layers.grid.get(row, col).unwrap());
            assert_eq!(hru.elevation as f64, layers.elevation.get(row, col).unwrap());
            assert_eq!(hru.landcover as f64, layers.landcover.get(row, col).unwrap());
            assert_eq!(hru.radiation as f64, layers.radiation.get(row, col).unwrap());
        }
    }
}

#[test]
fn nodata_cells_are_left_out_of_every_step() {
    let mut layers = synthetic(6, 6);
    layers.elevation.set_nodata(Some(-9999.0));
    for row in 0..6 {
        layers.elevation.set(row, 0, -9999.0).unwrap();
    }

    let coded = encode_hru(&layers, &EncodingConfig::default()).unwrap();
    assert_eq!(coded.nodata(), Some(HRU_NODATA));
    assert_eq!(coded.valid_count(), 30);

    let mut dissolved = dissolve(
        &polygonize(&coded, &PolygonizeParams::default()).unwrap(),
        &DissolveParams::default(),
    )
    .unwrap();
    add_area_field(&mut dissolved, &FieldSpec::default(), true).unwrap();
    let total_km2: f64 = dissolved
        .iter()
        .map(|f| f.get_property(AREAKM2).unwrap().as_f64().unwrap())
        .sum();
    assert_relative_eq!(total_km2, 30.0 * CELL * CELL / 1e6, max_relative = 1e-9);
    assert_eq!(dissolved.crs().and_then(|c| c.epsg()), Some(32719));
}
