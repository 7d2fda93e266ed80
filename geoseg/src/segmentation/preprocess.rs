//! Model boundary: tile → input tensor, output tensor → decoder layout.
//!
//! The inference runtime itself stays outside the crate behind
//! [`InferenceBackend`].

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{Result, SegError};

/// Input size the segmentation model was trained on
pub const MODEL_INPUT_SIZE: u32 = 256;

/// Normalised model input, NCHW `[1, 3, height, width]`, values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl ModelInput {
    /// `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height, self.width]
    }
}

/// Resize an RGB tile to `width × height` (bilinear), scale by 1/255 and lay
/// the channels out planar
pub fn preprocess_tile(tile: &RgbImage, width: u32, height: u32) -> ModelInput {
    let resized = if tile.dimensions() == (width, height) {
        tile.clone()
    } else {
        imageops::resize(tile, width, height, FilterType::Triangle)
    };

    let plane = width as usize * height as usize;
    let mut data = vec![0f32; plane * 3];
    for (i, pixel) in resized.pixels().enumerate() {
        for (c, &value) in pixel.0.iter().enumerate() {
            data[c * plane + i] = value as f32 / 255.0;
        }
    }

    ModelInput {
        height: height as usize,
        width: width as usize,
        data,
    }
}

/// Memory layout of a logits buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogitsLayout {
    /// `[height, width, num_classes]`, the decoder's layout
    Hwc,
    /// `[1, num_classes, height, width]`, the usual model output
    Nchw,
}

/// Raw model output
#[derive(Debug, Clone, PartialEq)]
pub struct LogitsTensor {
    layout: LogitsLayout,
    height: usize,
    width: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl LogitsTensor {
    pub fn new(
        layout: LogitsLayout,
        height: usize,
        width: usize,
        num_classes: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        let expected = height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(num_classes))
            .ok_or_else(|| {
                SegError::InvalidParameter(format!(
                    "logits shape {}x{}x{} overflows the address space",
                    height, width, num_classes
                ))
            })?;
        if data.len() != expected {
            return Err(SegError::DimensionMismatch {
                what: "logits tensor",
                expected,
                actual: data.len(),
            });
        }
        Ok(LogitsTensor {
            layout,
            height,
            width,
            num_classes,
            data,
        })
    }

    pub fn layout(&self) -> LogitsLayout {
        self.layout
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Re-lay the buffer as `[height, width, num_classes]`
    pub fn into_hwc(self) -> LogitsTensor {
        match self.layout {
            LogitsLayout::Hwc => self,
            LogitsLayout::Nchw => {
                let data = self.to_hwc();
                LogitsTensor {
                    layout: LogitsLayout::Hwc,
                    data,
                    ..self
                }
            }
        }
    }

    /// Copy of the buffer in `[height, width, num_classes]` order
    pub fn to_hwc(&self) -> Vec<f32> {
        match self.layout {
            LogitsLayout::Hwc => self.data.clone(),
            LogitsLayout::Nchw => {
                let plane = self.height * self.width;
                let mut out = vec![0f32; self.data.len()];
                for (c, channel) in self.data.chunks(plane).enumerate() {
                    for (i, &v) in channel.iter().enumerate() {
                        out[i * self.num_classes + c] = v;
                    }
                }
                out
            }
        }
    }
}

/// Blocking model inference: one preprocessed tile in, one logits tensor out
pub trait InferenceBackend {
    fn infer(&self, input: &ModelInput) -> anyhow::Result<LogitsTensor>;
}
