//! Output workspace directory management

use crate::error::{PipelineError, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sub-folder of the output directory receiving every product
pub const RESULTS_DIR: &str = "Results";

/// Make sure `base/subfolder` exists as a directory and return its path.
///
/// Missing parents are created. Existing contents are left alone.
pub fn ensure_workspace(base: impl AsRef<Path>, subfolder: &str) -> Result<PathBuf> {
    let path = base.as_ref().join(subfolder);
    let fail = |source: io::Error| PipelineError::WorkspaceCreation {
        path: path.clone(),
        source,
    };

    if path.is_dir() {
        info!("Workspace {} already exists", path.display());
        return Ok(path);
    }
    if path.exists() {
        return Err(fail(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        )));
    }

    std::fs::create_dir_all(&path).map_err(fail)?;
    info!("Created workspace {}", path.display());
    Ok(path)
}
