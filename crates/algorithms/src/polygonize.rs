//! Raster to polygon conversion
//!
//! Every maximal 4-connected region of equal cell value becomes one polygon
//! whose rings follow cell edges. Cells touching only at a corner are never
//! merged into the same region, which matches GDAL's default polygonize
//! connectivity.
//!
//! Rings are traced in pixel space on the integer vertex lattice
//! (vertex `(x, y)` is the top-left corner of cell `(row = y, col = x)`),
//! then mapped through the raster's geotransform.

use geo::{Coord, LineString, Polygon, Simplify};
use hrudel_core::raster::Raster;
use hrudel_core::vector::{AttributeValue, Feature, FeatureCollection, FieldDef, FieldType};
use hrudel_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Field name given to the cell value by default
pub const GRIDCODE: &str = "GRIDCODE";

/// 4-neighbourhood offsets: up, down, left, right
const N4: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Parameters for raster to polygon conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonizeParams {
    /// Attribute receiving the cell value
    pub field: String,
    /// Smooth stair-stepped outlines with Douglas-Peucker at half a cell.
    /// Off by default: simplified regions no longer tile the raster.
    pub simplify: bool,
}

impl Default for PolygonizeParams {
    fn default() -> Self {
        Self {
            field: GRIDCODE.to_string(),
            simplify: false,
        }
    }
}

type Vertex = (usize, usize);

/// A directed cell edge with its region cell on the left, as seen on screen
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
    cell: (usize, usize),
}

/// A 4-connected region of equal value
#[derive(Debug)]
struct Region {
    value: i64,
    cells: Vec<(usize, usize)>,
}

/// Label 4-connected regions of equal value, skipping no-data.
///
/// Regions are numbered from 1 in raster scan order of their first cell;
/// 0 marks no-data.
fn label_regions(raster: &Raster<i64>) -> (Array2<u32>, Vec<Region>) {
    let (rows, cols) = raster.shape();
    let data = raster.data();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut regions = Vec::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            let value = data[(row, col)];
            if labels[(row, col)] != 0 || raster.is_nodata(value) {
                continue;
            }

            let id = regions.len() as u32 + 1;
            let mut cells = Vec::new();
            labels[(row, col)] = id;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                cells.push((r, c));
                for &(dr, dc) in &N4 {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if labels[(nr, nc)] == 0 && data[(nr, nc)] == value {
                        labels[(nr, nc)] = id;
                        queue.push_back((nr, nc));
                    }
                }
            }

            regions.push(Region { value, cells });
        }
    }

    (labels, regions)
}

/// Boundary edges of one region, oriented so that exterior rings have a
/// negative shoelace area in pixel space and holes a positive one.
fn boundary_edges(labels: &Array2<u32>, id: u32, cells: &[(usize, usize)]) -> Vec<Edge> {
    let (rows, cols) = labels.dim();
    let outside = |r: isize, c: isize| {
        r < 0 || c < 0 || r >= rows as isize || c >= cols as isize || labels[(r as usize, c as usize)] != id
    };

    let mut edges = Vec::new();
    for &(r, c) in cells {
        let (ri, ci) = (r as isize, c as isize);
        let cell = (r, c);
        if outside(ri - 1, ci) {
            edges.push(Edge { from: (c + 1, r), to: (c, r), cell });
        }
        if outside(ri + 1, ci) {
            edges.push(Edge { from: (c, r + 1), to: (c + 1, r + 1), cell });
        }
        if outside(ri, ci - 1) {
            edges.push(Edge { from: (c, r), to: (c, r + 1), cell });
        }
        if outside(ri, ci + 1) {
            edges.push(Edge { from: (c + 1, r + 1), to: (c + 1, r), cell });
        }
    }
    edges
}

/// Link boundary edges into closed rings.
///
/// A vertex where the region touches itself diagonally has two outgoing
/// edges. The walk then crosses over to the diagonal cell, which keeps the
/// region's own diagonal contacts joined and every resulting ring simple.
fn trace_rings(edges: &[Edge]) -> Result<Vec<Vec<Vertex>>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let next_edge = |current: &Edge| -> Result<usize> {
        let candidates = outgoing
            .get(&current.to)
            .ok_or_else(|| Error::geoprocessing("polygonize", "open boundary while tracing ring"))?;
        let pick = match candidates.as_slice() {
            [only] => *only,
            many => many
                .iter()
                .copied()
                .find(|&i| edges[i].cell != current.cell)
                .unwrap_or(many[0]),
        };
        Ok(pick)
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        let mut ring = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            ring.push(edges[current].from);
            let next = next_edge(&edges[current])?;
            if next == start {
                break;
            }
            if used[next] {
                return Err(Error::geoprocessing("polygonize", "boundary edges do not form closed rings"));
            }
            current = next;
        }
        rings.push(ring);
    }

    Ok(rings)
}

/// Drop vertices lying on a straight run between their neighbours
fn drop_collinear(ring: &[Vertex]) -> Vec<Vertex> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let (px, py) = ring[(i + n - 1) % n];
            let (x, y) = ring[i];
            let (nx, ny) = ring[(i + 1) % n];
            !((px == x && x == nx) || (py == y && y == ny))
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed shoelace area in pixel space.
/// Negative for exterior rings, positive for holes.
fn signed_area2(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
        })
        .sum()
}

/// Build one polygon for a region
fn region_polygon(raster: &Raster<i64>, labels: &Array2<u32>, id: u32, region: &Region) -> Result<Polygon<f64>> {
    let edges = boundary_edges(labels, id, &region.cells);
    let transform = raster.transform();
    // Exterior rings must stay counter-clockwise in map space
    let reverse = !transform.flips_orientation();

    let to_line = |ring: &[Vertex]| -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = ring
            .iter()
            .map(|&(x, y)| {
                let (gx, gy) = transform.corner_to_geo(x, y);
                Coord { x: gx, y: gy }
            })
            .collect();
        if reverse {
            coords.reverse();
        }
        LineString::new(coords)
    };

    let mut exterior = None;
    let mut holes = Vec::new();
    for ring in trace_rings(&edges)? {
        let ring = drop_collinear(&ring);
        if signed_area2(&ring) < 0 {
            if exterior.replace(to_line(&ring)).is_some() {
                return Err(Error::geoprocessing(
                    "polygonize",
                    format!("region with value {} has more than one exterior ring", region.value),
                ));
            }
        } else {
            holes.push(to_line(&ring));
        }
    }

    let exterior = exterior.ok_or_else(|| {
        Error::geoprocessing("polygonize", format!("region with value {} has no exterior ring", region.value))
    })?;
    // Polygon::new closes every ring
    Ok(Polygon::new(exterior, holes))
}

/// Convert a coded raster to one polygon feature per 4-connected region.
///
/// Each feature carries the region's cell value in `params.field`.
/// Features are ordered by the raster scan position of their first cell.
pub fn polygonize(raster: &Raster<i64>, params: &PolygonizeParams) -> Result<FeatureCollection> {
    if raster.is_empty() {
        return Err(Error::geoprocessing("polygonize", "raster has no cells"));
    }

    let (labels, regions) = label_regions(raster);
    if regions.is_empty() {
        return Err(Error::geoprocessing("polygonize", "raster has no valid cells"));
    }
    info!("Polygonizing {} regions", regions.len());

    let tolerance = raster.cell_size() / 2.0;
    let mut collection = FeatureCollection::with_fields(vec![FieldDef::new(&params.field, FieldType::Integer)]);
    collection.set_crs(raster.crs().cloned());

    for (idx, region) in regions.iter().enumerate() {
        let mut polygon = region_polygon(raster, &labels, idx as u32 + 1, region)?;
        if params.simplify {
            polygon = polygon.simplify(&tolerance);
        }
        debug!(
            "Region {} (value {}): {} cells, {} holes",
            idx + 1,
            region.value,
            region.cells.len(),
            polygon.interiors().len()
        );
        collection.push(Feature::new(polygon).with_property(&params.field, AttributeValue::Int(region.value)));
    }

    Ok(collection)
}

/// Raster to polygon conversion as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Polygonize;

impl Algorithm for Polygonize {
    type Input = Raster<i64>;
    type Output = FeatureCollection;
    type Params = PolygonizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Polygonize"
    }

    fn description(&self) -> &'static str {
        "Convert 4-connected regions of equal value to polygons"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        polygonize(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{Area, Geometry};
    use hrudel_core::GeoTransform;

    fn coded(rows: usize, cols: usize, values: &[i64]) -> Raster<i64> {
        let mut r = Raster::from_vec(values.to_vec(), rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 30.0, 30.0, -30.0));
        r
    }

    fn polygons(fc: &FeatureCollection) -> Vec<(i64, Polygon<f64>)> {
        fc.iter()
            .map(|f| {
                let code = f.get_property(GRIDCODE).and_then(|v| v.as_i64()).unwrap();
                match f.geometry.clone().unwrap() {
                    Geometry::Polygon(p) => (code, p),
                    other => panic!("unexpected geometry {other:?}"),
                }
            })
            .collect()
    }

    #[test]
    fn test_constant_raster_is_one_square() {
        let raster = coded(3, 3, &[100_203_045; 9]);
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        let polys = polygons(&fc);

        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].0, 100_203_045);
        assert_relative_eq!(polys[0].1.unsigned_area(), 9.0 * 900.0);
        // Collinear vertices removed: 4 corners + closing point
        assert_eq!(polys[0].1.exterior().0.len(), 5);
        assert!(polys[0].1.signed_area() > 0.0, "exterior should be counter-clockwise");
    }

    #[test]
    fn test_hole_is_kept() {
        #[rustfmt::skip]
        let raster = coded(3, 3, &[
            1, 1, 1,
            1, 2, 1,
            1, 1, 1,
        ]);
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        let polys = polygons(&fc);

        assert_eq!(polys.len(), 2);
        let (code, ring) = &polys[0];
        assert_eq!(*code, 1);
        assert_eq!(ring.interiors().len(), 1);
        assert_relative_eq!(ring.unsigned_area(), 8.0 * 900.0);
        assert_relative_eq!(polys[1].1.unsigned_area(), 900.0);
    }

    #[test]
    fn test_diagonal_cells_are_separate_regions() {
        #[rustfmt::skip]
        let raster = coded(2, 2, &[
            5, 6,
            6, 5,
        ]);
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        assert_eq!(fc.len(), 4);
        let total: f64 = polygons(&fc).iter().map(|(_, p)| p.unsigned_area()).sum();
        assert_relative_eq!(total, 4.0 * 900.0);
    }

    #[test]
    fn test_region_touching_itself_at_a_corner() {
        // The 1-region wraps around the 2 and closes on itself diagonally
        // at the lower right, leaving a 3 cell outside it.
        #[rustfmt::skip]
        let raster = coded(3, 3, &[
            1, 1, 1,
            1, 2, 1,
            1, 1, 3,
        ]);
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        let polys = polygons(&fc);

        assert_eq!(polys.len(), 3);
        let ones = &polys[0].1;
        assert_eq!(polys[0].0, 1);
        assert_relative_eq!(ones.unsigned_area(), 7.0 * 900.0);
        assert_eq!(ones.interiors().len(), 1);

        let total: f64 = polys.iter().map(|(_, p)| p.unsigned_area()).sum();
        assert_relative_eq!(total, 9.0 * 900.0);
    }

    #[test]
    fn test_nodata_cells_are_skipped() {
        let mut raster = coded(2, 3, &[7, 7, i64::MIN, 7, i64::MIN, i64::MIN]);
        raster.set_nodata(Some(i64::MIN));
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        let polys = polygons(&fc);

        assert_eq!(polys.len(), 1);
        assert_relative_eq!(polys[0].1.unsigned_area(), 3.0 * 900.0);
    }

    #[test]
    fn test_all_nodata_fails() {
        let mut raster = coded(2, 2, &[i64::MIN; 4]);
        raster.set_nodata(Some(i64::MIN));
        let err = polygonize(&raster, &PolygonizeParams::default()).unwrap_err();
        assert!(matches!(err, Error::Geoprocessing { operation: "polygonize", .. }));
    }

    #[test]
    fn test_area_matches_cell_count_for_mixed_raster() {
        let values: Vec<i64> = (0..64).map(|i| ((i * 7) % 5) as i64).collect();
        let raster = coded(8, 8, &values);
        let fc = polygonize(&raster, &PolygonizeParams::default()).unwrap();
        let total: f64 = polygons(&fc).iter().map(|(_, p)| p.unsigned_area()).sum();
        assert_relative_eq!(total, 64.0 * 900.0, max_relative = 1e-12);
    }

    #[test]
    fn test_custom_field_name_and_crs() {
        let mut raster = coded(1, 2, &[3, 4]);
        raster.set_crs(Some(hrudel_core::CRS::from_epsg(3402)));
        let params = PolygonizeParams {
            field: "CODE".into(),
            ..PolygonizeParams::default()
        };
        let fc = Polygonize.execute(raster, params).unwrap();
        assert!(fc.has_field("CODE"));
        assert_eq!(fc.crs().and_then(|c| c.epsg()), Some(3402));
        assert_eq!(fc.features[1].get_property("CODE"), Some(&AttributeValue::Int(4)));
    }
}
