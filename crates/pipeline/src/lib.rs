//! # hrudel pipeline
//!
//! Runs HRU delineation end to end: workspace setup, encoding, polygonizing,
//! dissolving and area calculation, with each product committed atomically
//! under `<output>/Results`.

pub mod commit;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod workspace;

pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use layout::OutputLayout;
pub use pipeline::{run_pipeline, run_pipeline_with, PipelineConfig, PipelineInputs, PipelineReport};
pub use workspace::{ensure_workspace, RESULTS_DIR};
