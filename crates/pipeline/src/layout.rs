//! Names of the files a run produces

use crate::commit::partial_path;
use hrudel_core::io::{projection_path, shapefile_components};
use std::path::{Path, PathBuf};

/// Output paths of one run inside the workspace directory.
///
/// For HRU name `hru`:
/// `hru.tif` (coded raster), `hru_.shp` (polygons) and `hru__dis.shp`
/// (dissolved layer with areas). The dissolved name is the polygon layer
/// stem plus `_dis.shp`, hence the double underscore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub workspace: PathBuf,
    pub raster: PathBuf,
    pub polygons: PathBuf,
    pub dissolved: PathBuf,
}

impl OutputLayout {
    pub fn new(workspace: impl Into<PathBuf>, hru_name: &str) -> Self {
        let workspace = workspace.into();
        let polygons = workspace.join(format!("{hru_name}_.shp"));
        let dissolved = workspace.join(format!("{}_dis.shp", layer_stem(&polygons)));
        Self {
            raster: workspace.join(format!("{hru_name}.tif")),
            polygons,
            dissolved,
            workspace,
        }
    }

    /// Every file the run can write, shapefile components and `.prj` included
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.raster.clone()];
        files.extend(layer_files(&self.polygons));
        files.extend(layer_files(&self.dissolved));
        files
    }

    /// Temporary files an interrupted commit of this layout can leave behind
    pub fn partial_files(&self) -> Vec<PathBuf> {
        let mut files = vec![partial_path(&self.raster)];
        files.extend(layer_files(&partial_path(&self.polygons)));
        files.extend(layer_files(&partial_path(&self.dissolved)));
        files
    }

    /// Files from this layout already present on disk
    pub fn existing_files(&self) -> Vec<PathBuf> {
        self.all_files().into_iter().filter(|p| p.exists()).collect()
    }

    /// Leftover temporary files present on disk
    pub fn existing_partial_files(&self) -> Vec<PathBuf> {
        self.partial_files().into_iter().filter(|p| p.exists()).collect()
    }
}

fn layer_files(shp: &Path) -> Vec<PathBuf> {
    let mut files = shapefile_components(shp);
    files.push(projection_path(shp));
    files
}

/// File name of a layer without its `.shp` extension
fn layer_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Check that an HRU name can be used as a file stem
pub fn validate_hru_name(name: &str) -> hrudel_core::Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(hrudel_core::Error::InvalidParameter {
            name: "hru_name",
            value: name.to_string(),
            reason: "must be a plain file name".into(),
        });
    }
    Ok(())
}
