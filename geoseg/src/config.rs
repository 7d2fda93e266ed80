use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::geometric::extractor::Tessellation;
use crate::geometric::query::default_priority;
use crate::segmentation::decoder::{MajorityTieBreak, DEFAULT_KERNEL_SIZE};
use crate::segmentation::palette::Palette;
use crate::segmentation::preprocess::MODEL_INPUT_SIZE;

pub const TEMP_PATH: &str = "./temp";

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}

/// Pipeline settings. Every field has a default, so a partial JSON file is
/// enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Number of classes the model predicts
    pub num_classes: usize,
    /// Apply the majority filter after argmax
    pub refine: bool,
    /// Majority filter neighborhood (odd)
    pub kernel_size: usize,
    pub tie_break: MajorityTieBreak,
    /// Class search order for point queries
    pub query_priority: Vec<String>,
    /// Class labels that get vector output
    pub vectorize: Vec<String>,
    pub palette: Palette,
    pub tessellation: Tessellation,
    /// Directory for overlay PNGs and GeoJSON exports
    pub output_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            input_width: MODEL_INPUT_SIZE,
            input_height: MODEL_INPUT_SIZE,
            num_classes: 6,
            refine: true,
            kernel_size: DEFAULT_KERNEL_SIZE,
            tie_break: MajorityTieBreak::default(),
            query_priority: default_priority(),
            vectorize: default_priority(),
            palette: Palette::default(),
            tessellation: Tessellation::default(),
            output_path: get_temp_path(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(text).context("Failed to parse pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {:?}", path))?;
        Self::from_json_str(&text).context(format!("Invalid configuration in {:?}", path))
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .context("Failed to serialize pipeline configuration")?;
        std::fs::write(path, text)
            .context(format!("Failed to write configuration file: {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            bail!(
                "Model input size must be non-zero, got {}x{}",
                self.input_width,
                self.input_height
            );
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            bail!("Kernel size must be odd and positive, got {}", self.kernel_size);
        }
        self.palette.validate()?;
        if self.num_classes == 0 || self.num_classes > self.palette.len() {
            bail!(
                "num_classes must be in 1..={} (palette size), got {}",
                self.palette.len(),
                self.num_classes
            );
        }
        for label in &self.vectorize {
            match self.palette.index_of(label) {
                Some(i) if (i as usize) < self.num_classes => {}
                _ => bail!("Vectorized class '{}' is not a predicted palette label", label),
            }
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.query_priority.iter().find(|l| !seen.insert(l.as_str())) {
            bail!("Query priority lists '{}' twice", dup);
        }
        Ok(())
    }

    /// `(class index, label)` of every vectorized class, in `vectorize` order
    pub fn vectorized_classes(&self) -> Vec<(u8, String)> {
        self.vectorize
            .iter()
            .filter_map(|label| self.palette.index_of(label).map(|i| (i, label.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.input_width, 256);
        assert_eq!(config.num_classes, 6);
        assert_eq!(config.kernel_size, 3);
        assert_eq!(config.output_path, PathBuf::from("./temp"));
        assert_eq!(
            config.vectorized_classes(),
            vec![
                (0, "water".to_string()),
                (1, "land".to_string()),
                (2, "vegetation".to_string()),
                (3, "road".to_string()),
                (4, "building".to_string()),
            ]
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"kernel_size": 5, "tie_break": "last_in_scan"}"#)
                .unwrap();
        assert_eq!(config.kernel_size, 5);
        assert_eq!(config.tie_break, MajorityTieBreak::LastInScan);
        assert!(config.refine);
        assert_eq!(config.palette, Palette::default());
    }

    #[test]
    fn test_validation_failures() {
        assert!(PipelineConfig::from_json_str(r#"{"kernel_size": 4}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"num_classes": 7}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"vectorize": ["lava"]}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"query_priority": ["water", "water"]}"#).is_err());
        assert!(PipelineConfig::from_json_str(
            r#"{"palette": {"entries": [{"label": "a", "color": [0, 0, 0]}], "transparent_class": 3}}"#
        )
        .is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut config = PipelineConfig::default();
        config.tessellation = Tessellation::RowRuns;
        config.to_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
    }
}
