//! The five-stage delineation run
//!
//! 1. workspace: create `<output>/Results`
//! 2. encode: read the five factor rasters, write the coded raster
//! 3. polygonize: write one polygon per region
//! 4. dissolve: merge polygons per code
//! 5. area field: add `AREAKM2` and write the dissolved layer

use crate::commit::{commit_raster, commit_shapefile, remove_files};
use crate::error::{PipelineError, Result, Stage};
use crate::layout::{validate_hru_name, OutputLayout};
use crate::workspace::{ensure_workspace, RESULTS_DIR};
use hrudel_algorithms::{
    add_area_field, dissolve, encode_hru, polygonize, DissolveParams, EncodingConfig, Factor, FieldSpec, HruLayers,
    PolygonizeParams,
};
use hrudel_core::io::{read_geotiff, GeoTiffOptions};
use hrudel_core::Raster;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Paths of the five factor rasters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInputs {
    pub watershed: PathBuf,
    pub grid: PathBuf,
    pub elevation: PathBuf,
    pub landcover: PathBuf,
    pub radiation: PathBuf,
}

impl PipelineInputs {
    pub fn path(&self, factor: Factor) -> &Path {
        match factor {
            Factor::Watershed => &self.watershed,
            Factor::Grid => &self.grid,
            Factor::Elevation => &self.elevation,
            Factor::LandCover => &self.landcover,
            Factor::Radiation => &self.radiation,
        }
    }

    fn all(&self) -> Vec<&Path> {
        Factor::ALL.iter().map(|f| self.path(*f)).collect()
    }
}

/// Settings for every stage of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub encoding: EncodingConfig,
    pub polygonize: PolygonizeParams,
    pub dissolve: DissolveParams,
    pub area_field: FieldSpec,
    /// Replace outputs left by an earlier run
    pub overwrite: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            polygonize: PolygonizeParams::default(),
            dissolve: DissolveParams::default(),
            area_field: FieldSpec::default(),
            overwrite: true,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub layout: OutputLayout,
    pub rows: usize,
    pub cols: usize,
    pub valid_cells: usize,
    pub polygons: usize,
    pub hrus: usize,
    pub total_area_km2: f64,
    pub elapsed: Duration,
}

/// Run the whole pipeline with no stage callback
pub fn run_pipeline(
    inputs: &PipelineInputs,
    output_dir: impl AsRef<Path>,
    hru_name: &str,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    run_pipeline_with(inputs, output_dir, hru_name, config, |_| {})
}

/// Run the whole pipeline, calling `on_stage` as each stage begins.
///
/// Stages run in order and the first failure stops the run. Every output
/// file is written atomically, so a failed stage leaves no partial file
/// behind. With `config.overwrite` set, outputs of an earlier run under
/// the same name are removed before stage 2; otherwise their presence is
/// an [`PipelineError::OutputExists`] error and nothing is written.
pub fn run_pipeline_with(
    inputs: &PipelineInputs,
    output_dir: impl AsRef<Path>,
    hru_name: &str,
    config: &PipelineConfig,
    mut on_stage: impl FnMut(Stage),
) -> Result<PipelineReport> {
    let start = Instant::now();
    let all_inputs = inputs.all();

    // Stage 1
    on_stage(Stage::Workspace);
    validate_hru_name(hru_name).map_err(|e| PipelineError::stage(Stage::Workspace, &[], e))?;
    let workspace = ensure_workspace(output_dir, RESULTS_DIR)?;
    let layout = OutputLayout::new(workspace, hru_name);
    prepare_outputs(&layout, config.overwrite)?;

    // Stage 2
    on_stage(Stage::Encode);
    let layers = read_layers(inputs)?;
    let coded = encode_hru(&layers, &config.encoding)
        .map_err(|e| PipelineError::stage(Stage::Encode, &all_inputs, e))?;
    drop(layers);
    commit_raster(&coded, &layout.raster, &GeoTiffOptions::float64())
        .map_err(|e| PipelineError::write(Stage::Encode, &layout.raster, e))?;
    info!("Wrote coded raster {}", layout.raster.display());

    // Stage 3
    on_stage(Stage::Polygonize);
    let polygons = polygonize(&coded, &config.polygonize)
        .map_err(|e| PipelineError::stage(Stage::Polygonize, &[layout.raster.as_path()], e))?;
    commit_shapefile(&polygons, &layout.polygons)
        .map_err(|e| PipelineError::write(Stage::Polygonize, &layout.polygons, e))?;
    info!("Wrote {} polygons to {}", polygons.len(), layout.polygons.display());

    // Stage 4
    on_stage(Stage::Dissolve);
    let mut dissolved = dissolve(&polygons, &config.dissolve)
        .map_err(|e| PipelineError::stage(Stage::Dissolve, &[layout.polygons.as_path()], e))?;
    info!("Dissolved {} polygons into {} HRUs", polygons.len(), dissolved.len());

    // Stage 5
    on_stage(Stage::AreaField);
    add_area_field(&mut dissolved, &config.area_field, true)
        .map_err(|e| PipelineError::stage(Stage::AreaField, &[layout.dissolved.as_path()], e))?;
    commit_shapefile(&dissolved, &layout.dissolved)
        .map_err(|e| PipelineError::write(Stage::AreaField, &layout.dissolved, e))?;
    info!("Wrote HRU layer {}", layout.dissolved.display());

    let total_area_km2 = dissolved
        .iter()
        .filter_map(|f| f.get_property(&config.area_field.name))
        .filter_map(|v| v.as_f64())
        .sum();

    Ok(PipelineReport {
        rows: coded.rows(),
        cols: coded.cols(),
        valid_cells: coded.valid_count(),
        polygons: polygons.len(),
        hrus: dissolved.len(),
        total_area_km2,
        elapsed: start.elapsed(),
        layout,
    })
}

/// Clear or guard against outputs of an earlier run.
///
/// Temporary files of an interrupted commit are swept either way.
fn prepare_outputs(layout: &OutputLayout, overwrite: bool) -> Result<()> {
    let stale = layout.existing_partial_files();
    if !stale.is_empty() {
        let removed = remove_files(&stale).map_err(|e| PipelineError::stage(Stage::Workspace, &[], e))?;
        warn!("Removed {} temporary files left by an interrupted run", removed);
    }

    let existing = layout.existing_files();
    if existing.is_empty() {
        return Ok(());
    }
    if !overwrite {
        return Err(PipelineError::OutputExists {
            path: existing[0].clone(),
        });
    }
    let removed = remove_files(&existing).map_err(|e| PipelineError::stage(Stage::Workspace, &[], e))?;
    info!("Removed {} files from an earlier run", removed);
    Ok(())
}

fn read_layer(path: &Path) -> Result<Raster<f64>> {
    let raster: Raster<f64> = read_geotiff(path).map_err(|e| PipelineError::stage(Stage::Encode, &[path], e))?;
    debug!("Read {} ({} x {})", path.display(), raster.cols(), raster.rows());
    Ok(raster)
}

fn read_layers(inputs: &PipelineInputs) -> Result<HruLayers> {
    Ok(HruLayers {
        watershed: read_layer(&inputs.watershed)?,
        grid: read_layer(&inputs.grid)?,
        elevation: read_layer(&inputs.elevation)?,
        landcover: read_layer(&inputs.landcover)?,
        radiation: read_layer(&inputs.radiation)?,
    })
}
