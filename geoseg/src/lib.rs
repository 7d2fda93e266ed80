//! Segmentation-to-geovector pipeline.
//!
//! Turns per-pixel class logits for a selected map extent into a color overlay
//! and per-class GeoJSON polygon collections, stores those collections by class
//! label and answers point queries against them.

pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod pipeline;
pub mod segmentation;

pub use config::{PipelineConfig, TEMP_PATH};
pub use error::{Result, SegError};
pub use geo_core::{
    geo_to_pixel, pixel_to_geo, to_geographic, to_projected, Extent, GeoPoint, ProjectedExtent,
    ProjectedPoint,
};
pub use pipeline::{RunOutcome, RunOutput, RunSummary, RunTicket, SegmentationPipeline};
