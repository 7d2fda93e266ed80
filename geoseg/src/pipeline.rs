//! Selection → overlay + per-class vectors, with latest-selection-wins.
//!
//! Every selection bumps a generation counter and receives a [`RunTicket`].
//! A run checks its ticket between stages and once more under the commit
//! lock; a run whose generation is no longer the latest is discarded and
//! writes nothing to the store.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::SegError;
use crate::geo_core::{Extent, GeoPoint};
use crate::geometric::extractor::PolygonExtractor;
use crate::geometric::feature_store::{BlobStore, FeatureStore};
use crate::geometric::features::ClassFeatureCollection;
use crate::geometric::query::{query, QueryHit};
use crate::geometric::spatial_index::ClassQueryIndex;
use crate::segmentation::decoder::SegmentationDecoder;
use crate::segmentation::overlay::{to_overlay_image, RgbaOverlay};
use crate::segmentation::preprocess::{preprocess_tile, InferenceBackend, LogitsTensor};
use crate::segmentation::raster::ClassRaster;

/// Handle for one selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunTicket {
    generation: u64,
    extent: Extent,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }
}

/// Everything one completed run produced
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub generation: u64,
    pub extent: Extent,
    pub raster: ClassRaster,
    pub overlay: RgbaOverlay,
    /// One collection per vectorized class, in configuration order
    pub collections: Vec<ClassFeatureCollection>,
    pub completed_at: DateTime<Utc>,
}

/// Run metadata written next to the outputs as `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generation: u64,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub extent: [f64; 4],
    pub width: usize,
    pub height: usize,
    /// Pixel count per class index
    pub histogram: Vec<usize>,
    /// Feature count per vectorized class label
    pub features: Vec<(String, usize)>,
    pub completed_at: DateTime<Utc>,
}

impl RunOutput {
    pub fn collection(&self, label: &str) -> Option<&ClassFeatureCollection> {
        self.collections.iter().find(|c| c.label == label)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            generation: self.generation,
            extent: self.extent.to_array(),
            width: self.raster.width(),
            height: self.raster.height(),
            histogram: self.raster.histogram(),
            features: self
                .collections
                .iter()
                .map(|c| (c.label.clone(), c.len()))
                .collect(),
            completed_at: self.completed_at,
        }
    }

    /// Write `overlay.png`, `run.json` and one `{label}.geojson` per class
    /// into `dir`
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create output directory: {:?}", dir))?;

        let mut written = Vec::with_capacity(self.collections.len() + 2);
        let overlay_path = dir.join("overlay.png");
        self.overlay.save_png(&overlay_path)?;
        written.push(overlay_path);

        let summary_path = dir.join("run.json");
        let summary = serde_json::to_string_pretty(&self.summary())
            .context("Failed to serialize run summary")?;
        std::fs::write(&summary_path, summary)
            .context(format!("Failed to write run summary: {:?}", summary_path))?;
        written.push(summary_path);

        for collection in &self.collections {
            written.push(collection.to_geojson_file(dir, None)?);
        }
        log::info!("Run {} outputs saved to: {:?}", self.generation, dir);
        Ok(written)
    }
}

/// Result of a run attempt
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// A newer selection started before this run could commit
    Superseded { generation: u64, latest: u64 },
    Completed(RunOutput),
}

impl RunOutcome {
    pub fn completed(self) -> Option<RunOutput> {
        match self {
            RunOutcome::Completed(output) => Some(output),
            RunOutcome::Superseded { .. } => None,
        }
    }
}

/// Segmentation session: owns the model backend, the feature store and the
/// index of the latest committed run
pub struct SegmentationPipeline<B: InferenceBackend, S: BlobStore> {
    config: PipelineConfig,
    decoder: SegmentationDecoder,
    backend: B,
    store: FeatureStore<S>,
    generation: AtomicU64,
    /// Commit lock, guarding the index of the last committed run
    committed: Mutex<Option<Arc<ClassQueryIndex>>>,
}

impl<B: InferenceBackend, S: BlobStore> SegmentationPipeline<B, S> {
    pub fn new(config: PipelineConfig, backend: B, blobs: S) -> Result<Self> {
        config.validate()?;
        let decoder = if config.refine {
            SegmentationDecoder::new(config.kernel_size, config.tie_break)?
        } else {
            SegmentationDecoder::without_refinement()
        };

        Ok(SegmentationPipeline {
            config,
            decoder,
            backend,
            store: FeatureStore::new(blobs),
            generation: AtomicU64::new(0),
            committed: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &FeatureStore<S> {
        &self.store
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new selection; any run holding an older ticket is superseded
    pub fn begin_selection(&self, extent: Extent) -> RunTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "Selection {} started for extent {:?}",
            generation,
            extent.to_array()
        );
        RunTicket { generation, extent }
    }

    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        self.current_generation() == ticket.generation
    }

    fn superseded(&self, ticket: &RunTicket, stage: &str) -> Option<RunOutcome> {
        let latest = self.current_generation();
        if latest == ticket.generation {
            return None;
        }
        log::warn!(
            "Run {} superseded by selection {} ({}), discarding",
            ticket.generation,
            latest,
            stage
        );
        Some(RunOutcome::Superseded {
            generation: ticket.generation,
            latest,
        })
    }

    /// Full run from an RGB tile: preprocess, infer, then [`Self::run_logits`]
    pub fn run(&self, ticket: &RunTicket, tile: &RgbImage) -> Result<RunOutcome> {
        if let Some(outcome) = self.superseded(ticket, "before preprocessing") {
            return Ok(outcome);
        }
        let input = preprocess_tile(tile, self.config.input_width, self.config.input_height);

        let started = Instant::now();
        let logits = self
            .backend
            .infer(&input)
            .context(format!("Inference failed for run {}", ticket.generation))?;
        log::debug!(
            "Inference for run {} took {:?}",
            ticket.generation,
            started.elapsed()
        );

        self.run_logits(ticket, logits)
    }

    /// Decode, render, extract and commit a logits tensor
    pub fn run_logits(&self, ticket: &RunTicket, logits: LogitsTensor) -> Result<RunOutcome> {
        if let Some(outcome) = self.superseded(ticket, "before decoding") {
            return Ok(outcome);
        }

        if logits.num_classes() != self.config.num_classes {
            return Err(SegError::DimensionMismatch {
                what: "logits classes",
                expected: self.config.num_classes,
                actual: logits.num_classes(),
            })
            .context(format!("Run {} received logits for the wrong model", ticket.generation));
        }

        let logits = logits.into_hwc();
        let raster = self.decoder.decode(
            logits.data(),
            logits.height(),
            logits.width(),
            logits.num_classes(),
        )?;
        raster.check_palette(&self.config.palette)?;
        log::debug!(
            "Run {} class histogram: {:?}",
            ticket.generation,
            raster.histogram()
        );

        let overlay = to_overlay_image(&raster, &self.config.palette);

        if let Some(outcome) = self.superseded(ticket, "before extraction") {
            return Ok(outcome);
        }

        let extractor = PolygonExtractor::new(ticket.extent)
            .with_tessellation(self.config.tessellation)
            .with_run_id(ticket.generation);
        let collections: Vec<ClassFeatureCollection> = self
            .config
            .vectorized_classes()
            .into_iter()
            .map(|(class_index, label)| extractor.extract_class(&raster, class_index, &label))
            .collect();
        let encoded = collections
            .iter()
            .map(|c| FeatureStore::<S>::encode(&c.label, c).map(|text| (c.label.as_str(), text)))
            .collect::<Result<Vec<_>>>()?;
        let index = ClassQueryIndex::new(collections.clone(), &self.config.query_priority);

        {
            let mut committed = self
                .committed
                .lock()
                .map_err(|_| anyhow!("Commit lock poisoned"))?;
            if let Some(outcome) = self.superseded(ticket, "at commit") {
                return Ok(outcome);
            }
            for (label, text) in &encoded {
                if let Err(e) = self.store.put_encoded(label, text) {
                    // Part of the store may now hold this run; stop answering
                    // from the previous run's index
                    *committed = None;
                    log::error!("Run {} failed to commit '{}': {:#}", ticket.generation, label, e);
                    return Err(e.context(format!("Run {} commit failed", ticket.generation)));
                }
            }
            *committed = Some(Arc::new(index));
        }

        log::info!(
            "Run {} committed: {} polygons in {} classes",
            ticket.generation,
            collections.iter().map(|c| c.len()).sum::<usize>(),
            collections.len()
        );

        Ok(RunOutcome::Completed(RunOutput {
            generation: ticket.generation,
            extent: ticket.extent,
            raster,
            overlay,
            collections,
            completed_at: Utc::now(),
        }))
    }

    /// Index of the last committed run, if any
    pub fn committed_index(&self) -> Result<Option<Arc<ClassQueryIndex>>> {
        Ok(self
            .committed
            .lock()
            .map_err(|_| anyhow!("Commit lock poisoned"))?
            .clone())
    }

    /// First feature containing `point`, searched in priority order.
    ///
    /// Uses the index of the last committed run; before any commit, or after
    /// a failed one, the collections already in the store are scanned.
    pub fn query_point(&self, point: &GeoPoint) -> Result<Option<QueryHit>> {
        point.validate()?;
        if let Some(index) = self.committed_index()? {
            return Ok(index.query(point));
        }

        let labels = self.store.labels()?;
        let collections = self.store.load_all(&labels)?;
        Ok(query(point, &collections, &self.config.query_priority))
    }
}
