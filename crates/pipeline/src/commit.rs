//! Write-then-rename output commits
//!
//! Each product is written under a hidden temporary name in the same
//! directory and renamed into place once complete, so a reader never sees
//! a half-written file. Shapefiles move all their component files.

use hrudel_core::io::{projection_path, shapefile_components, write_geotiff, write_shapefile, GeoTiffOptions};
use hrudel_core::vector::FeatureCollection;
use hrudel_core::{Error, Raster, RasterElement, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hidden sibling used while `path` is being written.
///
/// The extension is kept so format writers derive the right component
/// names: `dir/hru_.shp` becomes `dir/.hru_.partial.shp`.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(".{stem}.partial.{}", ext.to_string_lossy()),
        None => format!(".{stem}.partial"),
    };
    path.with_file_name(name)
}

fn remove_quietly(paths: &[PathBuf]) {
    for p in paths {
        if p.exists() {
            if let Err(e) = std::fs::remove_file(p) {
                warn!("Could not remove {}: {}", p.display(), e);
            }
        }
    }
}

/// Move finished temporary files onto their final names
fn rename_all(pairs: &[(PathBuf, PathBuf)]) -> Result<()> {
    for (from, to) in pairs {
        std::fs::rename(from, to)?;
        debug!("Committed {}", to.display());
    }
    Ok(())
}

/// Write a raster to `path` atomically
pub fn commit_raster<T: RasterElement>(raster: &Raster<T>, path: &Path, options: &GeoTiffOptions) -> Result<()> {
    let tmp = partial_path(path);
    if let Err(e) = write_geotiff(raster, &tmp, options) {
        remove_quietly(&[tmp]);
        return Err(e);
    }
    rename_all(&[(tmp, path.to_path_buf())])
}

/// Write a shapefile layer to `path` atomically.
///
/// The `.prj` moves with the other components when the writer produced one.
pub fn commit_shapefile(collection: &FeatureCollection, path: &Path) -> Result<()> {
    let tmp = partial_path(path);
    let tmp_prj = projection_path(&tmp);
    let mut tmp_parts = shapefile_components(&tmp);
    if let Err(e) = write_shapefile(collection, &tmp) {
        tmp_parts.push(tmp_prj);
        remove_quietly(&tmp_parts);
        return Err(e);
    }

    let mut pairs: Vec<(PathBuf, PathBuf)> = tmp_parts.into_iter().zip(shapefile_components(path)).collect();
    if let Some((missing, _)) = pairs.iter().find(|(from, _)| !from.exists()) {
        let err = Error::Shapefile(format!("writer did not produce {}", missing.display()));
        let mut leftovers: Vec<PathBuf> = pairs.iter().map(|(from, _)| from.clone()).collect();
        leftovers.push(tmp_prj);
        remove_quietly(&leftovers);
        return Err(err);
    }
    if tmp_prj.exists() {
        pairs.push((tmp_prj, projection_path(path)));
    }
    rename_all(&pairs)
}

/// Delete the given files if present. Returns how many were removed.
pub fn remove_files(paths: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for p in paths {
        if p.exists() {
            std::fs::remove_file(p)?;
            debug!("Removed stale {}", p.display());
            removed += 1;
        }
    }
    Ok(removed)
}
