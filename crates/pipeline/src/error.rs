//! Pipeline error types

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One step of the delineation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Workspace,
    Encode,
    Polygonize,
    Dissolve,
    AreaField,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Workspace => "workspace",
            Stage::Encode => "encode",
            Stage::Polygonize => "polygonize",
            Stage::Dissolve => "dissolve",
            Stage::AreaField => "area field",
        }
    }

    /// 1-based position in the run
    pub fn number(&self) -> usize {
        match self {
            Stage::Workspace => 1,
            Stage::Encode => 2,
            Stage::Polygonize => 3,
            Stage::Dissolve => 4,
            Stage::AreaField => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

/// Broad failure class, used to pick a process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MisalignedGrid,
    EncodingRange,
    WorkspaceCreation,
    DuplicateField,
    Geoprocessing,
    OutputExists,
    Other,
}

impl ErrorKind {
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Other => 1,
            ErrorKind::MisalignedGrid => 3,
            ErrorKind::EncodingRange => 4,
            ErrorKind::WorkspaceCreation => 5,
            ErrorKind::DuplicateField => 6,
            ErrorKind::Geoprocessing => 7,
            ErrorKind::OutputExists => 8,
        }
    }
}

/// Error type for a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot create workspace {path}")]
    WorkspaceCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output {path} already exists and overwriting is disabled")]
    OutputExists { path: PathBuf },

    /// A stage produced its result but could not commit it to disk
    #[error("{stage} could not write {path}")]
    Write {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: hrudel_core::Error,
    },

    #[error("{stage} failed for {inputs}")]
    Stage {
        stage: Stage,
        inputs: String,
        #[source]
        source: hrudel_core::Error,
    },
}

impl PipelineError {
    pub(crate) fn stage(stage: Stage, inputs: &[&std::path::Path], source: hrudel_core::Error) -> Self {
        let inputs = inputs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        PipelineError::Stage { stage, inputs, source }
    }

    pub(crate) fn write(stage: Stage, path: &std::path::Path, source: hrudel_core::Error) -> Self {
        PipelineError::Write {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use hrudel_core::Error as CoreError;
        match self {
            PipelineError::WorkspaceCreation { .. } => ErrorKind::WorkspaceCreation,
            PipelineError::OutputExists { .. } => ErrorKind::OutputExists,
            PipelineError::Write { .. } => ErrorKind::Geoprocessing,
            PipelineError::Stage { source, .. } => match source {
                CoreError::MisalignedGrid { .. } => ErrorKind::MisalignedGrid,
                CoreError::EncodingRange { .. } => ErrorKind::EncodingRange,
                CoreError::DuplicateField(_) => ErrorKind::DuplicateField,
                CoreError::Geoprocessing { .. } => ErrorKind::Geoprocessing,
                _ => ErrorKind::Other,
            },
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_stage_error_names_stage_and_inputs() {
        let err = PipelineError::stage(
            Stage::Encode,
            &[Path::new("ws.tif"), Path::new("grid.tif")],
            hrudel_core::Error::MisalignedGrid {
                layer: "grid".into(),
                reason: "is 2x2 cells, watershed is 3x3".into(),
            },
        );
        assert_eq!(err.to_string(), "stage 2 (encode) failed for ws.tif, grid.tif");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_codes() {
        let geo = PipelineError::stage(Stage::Dissolve, &[], hrudel_core::Error::geoprocessing("dissolve", "x"));
        assert_eq!(geo.exit_code(), 7);

        let dup = PipelineError::stage(Stage::AreaField, &[], hrudel_core::Error::DuplicateField("AREAKM2".into()));
        assert_eq!(dup.kind(), ErrorKind::DuplicateField);

        // Unreadable input is not a geoprocessing failure
        let io = PipelineError::stage(Stage::Encode, &[], hrudel_core::Error::Tiff("bad header".into()));
        assert_eq!(io.exit_code(), 1);

        let exists = PipelineError::OutputExists { path: "a.tif".into() };
        assert_eq!(exists.exit_code(), 8);
    }

    #[test]
    fn test_failed_output_write_is_geoprocessing() {
        for source in [
            hrudel_core::Error::Tiff("disk full".into()),
            hrudel_core::Error::Shapefile("short write".into()),
            hrudel_core::Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")),
        ] {
            let err = PipelineError::write(Stage::Polygonize, Path::new("Results/hru_.shp"), source);
            assert_eq!(err.kind(), ErrorKind::Geoprocessing);
            assert_eq!(err.exit_code(), 7);
            assert_eq!(err.to_string(), "stage 3 (polygonize) could not write Results/hru_.shp");
        }
    }
}
