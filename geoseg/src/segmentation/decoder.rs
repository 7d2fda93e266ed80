//! Logits → class raster decoding.
//!
//! Decoding runs in two passes:
//! 1. per pixel, a max-subtracted softmax over the class logits followed by an
//!    argmax where the lowest class index wins ties;
//! 2. an optional majority filter over a square, odd-sized neighborhood.
//!    Out-of-bounds neighbors are excluded from the count (no padding, no
//!    wraparound). The filter reads the raw raster and writes a fresh one, so
//!    the result does not depend on scan order.
//!
//! Both passes work row by row and parallelise over rows when the `rayon`
//! feature is enabled.

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegError};
use crate::segmentation::raster::{ClassRaster, MAX_CLASSES};

/// Neighborhood size used when none is configured
pub const DEFAULT_KERNEL_SIZE: usize = 3;

/// Rule applied when several labels are equally frequent in a neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MajorityTieBreak {
    /// The lowest class index wins
    #[default]
    LowestClass,
    /// The label whose last occurrence comes latest in the row-major scan of
    /// the neighborhood wins (top row first, left to right)
    LastInScan,
}

/// Numerically stable softmax.
///
/// The maximum logit is subtracted before exponentiating, so large logits do
/// not overflow. Inputs are expected to be finite.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let mut out = Vec::with_capacity(logits.len());
    softmax_into(logits, &mut out);
    out
}

fn softmax_into(logits: &[f32], out: &mut Vec<f64>) {
    out.clear();
    let max_logit = logits
        .iter()
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v as f64));

    let mut sum_exps = 0.0;
    for &v in logits {
        let e = (v as f64 - max_logit).exp();
        sum_exps += e;
        out.push(e);
    }
    for p in out.iter_mut() {
        *p /= sum_exps;
    }
}

/// Index of the largest value; the first index wins ties. Returns 0 for an
/// empty slice.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Decode a `[height, width, num_classes]` logits buffer into a raw class
/// raster (softmax + argmax per pixel, no refinement).
pub fn decode_logits(
    logits: &[f32],
    height: usize,
    width: usize,
    num_classes: usize,
) -> Result<ClassRaster> {
    if num_classes < 1 {
        return Err(SegError::InvalidParameter(
            "num_classes must be at least 1".to_string(),
        ));
    }
    if num_classes > MAX_CLASSES {
        return Err(SegError::InvalidParameter(format!(
            "num_classes {} exceeds the {} addressable class indices",
            num_classes, MAX_CLASSES
        )));
    }
    if height == 0 || width == 0 {
        return Err(SegError::InvalidParameter(format!(
            "raster dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }

    let expected = height
        .checked_mul(width)
        .and_then(|n| n.checked_mul(num_classes))
        .ok_or_else(|| {
            SegError::InvalidParameter(format!(
                "dimensions {}x{}x{} overflow the address space",
                height, width, num_classes
            ))
        })?;
    if logits.len() != expected {
        return Err(SegError::DimensionMismatch {
            what: "logits buffer",
            expected,
            actual: logits.len(),
        });
    }
    if let Some(index) = logits.iter().position(|v| !v.is_finite()) {
        return Err(SegError::NonFiniteInput {
            what: "logits",
            index,
        });
    }

    let mut data = vec![0u8; height * width];
    let row_stride = width * num_classes;

    #[cfg(feature = "rayon")]
    data.par_chunks_mut(width)
        .zip(logits.par_chunks(row_stride))
        .for_each(|(row, row_logits)| decode_row(row_logits, num_classes, row));

    #[cfg(not(feature = "rayon"))]
    data.chunks_mut(width)
        .zip(logits.chunks(row_stride))
        .for_each(|(row, row_logits)| decode_row(row_logits, num_classes, row));

    Ok(ClassRaster::from_decoded(width, height, num_classes, data))
}

fn decode_row(row_logits: &[f32], num_classes: usize, row: &mut [u8]) {
    let mut probs = Vec::with_capacity(num_classes);
    for (cell, pixel_logits) in row.iter_mut().zip(row_logits.chunks(num_classes)) {
        softmax_into(pixel_logits, &mut probs);
        *cell = argmax(&probs) as u8;
    }
}

/// Reassign every pixel to the most frequent label of its
/// `kernel_size × kernel_size` neighborhood.
pub fn majority_filter(
    raster: &ClassRaster,
    kernel_size: usize,
    tie_break: MajorityTieBreak,
) -> Result<ClassRaster> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(SegError::InvalidParameter(format!(
            "kernel size must be odd and positive, got {}",
            kernel_size
        )));
    }

    let width = raster.width();
    let height = raster.height();
    let radius = kernel_size / 2;
    let mut data = vec![0u8; width * height];

    #[cfg(feature = "rayon")]
    data.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| filter_row(raster, y, radius, tie_break, row));

    #[cfg(not(feature = "rayon"))]
    data.chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| filter_row(raster, y, radius, tie_break, row));

    Ok(ClassRaster::from_decoded(
        width,
        height,
        raster.num_classes(),
        data,
    ))
}

fn filter_row(
    raster: &ClassRaster,
    y: usize,
    radius: usize,
    tie_break: MajorityTieBreak,
    out: &mut [u8],
) {
    let width = raster.width();
    let cells = raster.data();
    let num_classes = raster.num_classes();

    let y0 = y.saturating_sub(radius);
    let y1 = (y + radius).min(raster.height() - 1);

    // Occurrence count and 1-based position of the last occurrence per label
    let mut counts = vec![0u32; num_classes];
    let mut last_seen = vec![0usize; num_classes];

    for (x, cell) in out.iter_mut().enumerate() {
        counts.iter_mut().for_each(|c| *c = 0);
        last_seen.iter_mut().for_each(|p| *p = 0);

        let x0 = x.saturating_sub(radius);
        let x1 = (x + radius).min(width - 1);

        let mut position = 0;
        for ny in y0..=y1 {
            for &label in &cells[ny * width + x0..=ny * width + x1] {
                position += 1;
                counts[label as usize] += 1;
                last_seen[label as usize] = position;
            }
        }

        let mut best = 0usize;
        for label in 1..num_classes {
            let better = match counts[label].cmp(&counts[best]) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => {
                    tie_break == MajorityTieBreak::LastInScan
                        && counts[label] > 0
                        && last_seen[label] > last_seen[best]
                }
                std::cmp::Ordering::Less => false,
            };
            if better {
                best = label;
            }
        }
        *cell = best as u8;
    }
}

/// Full decoding stage: softmax/argmax followed by optional refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationDecoder {
    kernel_size: usize,
    tie_break: MajorityTieBreak,
    refine: bool,
}

impl SegmentationDecoder {
    pub fn new(kernel_size: usize, tie_break: MajorityTieBreak) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(SegError::InvalidParameter(format!(
                "kernel size must be odd and positive, got {}",
                kernel_size
            )));
        }
        Ok(SegmentationDecoder {
            kernel_size,
            tie_break,
            refine: true,
        })
    }

    /// Argmax only, no majority filter
    pub fn without_refinement() -> Self {
        SegmentationDecoder {
            kernel_size: DEFAULT_KERNEL_SIZE,
            tie_break: MajorityTieBreak::default(),
            refine: false,
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn refines(&self) -> bool {
        self.refine
    }

    /// Decode a `[height, width, num_classes]` logits buffer
    pub fn decode(
        &self,
        logits: &[f32],
        height: usize,
        width: usize,
        num_classes: usize,
    ) -> Result<ClassRaster> {
        let raw = decode_logits(logits, height, width, num_classes)?;
        log::debug!(
            "Decoded {}x{} logits ({} classes)",
            width,
            height,
            num_classes
        );

        if !self.refine {
            return Ok(raw);
        }

        let refined = majority_filter(&raw, self.kernel_size, self.tie_break)?;
        log::debug!(
            "Majority filter {}x{} ({:?})",
            self.kernel_size,
            self.kernel_size,
            self.tie_break
        );
        Ok(refined)
    }
}

impl Default for SegmentationDecoder {
    fn default() -> Self {
        SegmentationDecoder {
            kernel_size: DEFAULT_KERNEL_SIZE,
            tie_break: MajorityTieBreak::default(),
            refine: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_softmax_sums_to_one() {
        for logits in [
            vec![0.0f32, 1.0, 2.0],
            vec![-3.5, 12.0, 0.25, 7.0, -1.0],
            vec![5.0],
            vec![1000.0, 1001.0, 1002.0],
        ] {
            let probs = softmax(&logits);
            assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-5);
            assert!(probs.iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_softmax_shift_invariant() {
        let logits = [0.3f32, -1.2, 2.5, 0.0];
        let shifted: Vec<f32> = logits.iter().map(|v| v + 10.0).collect();
        let a = softmax(&logits);
        let b = softmax(&shifted);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_argmax_first_index_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(argmax(&[0.1, 0.9, 0.0]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_zero_logits_decode_to_class_zero() {
        for _ in 0..10 {
            let raster = decode_logits(&[0.0, 0.0, 0.0], 1, 1, 3).unwrap();
            assert_eq!(raster.get(0, 0), Some(0));
        }
    }

    #[test]
    fn test_decode_logits_layout() {
        // 1x3 raster, 2 classes: [c0 wins, c1 wins, c1 wins]
        let logits = [3.0, 1.0, 0.0, 4.0, -2.0, -1.0];
        let raster = decode_logits(&logits, 1, 3, 2).unwrap();
        assert_eq!(raster.to_rows(), vec![vec![0, 1, 1]]);
    }

    #[test]
    fn test_decode_logits_errors() {
        assert!(matches!(
            decode_logits(&[], 1, 1, 0),
            Err(SegError::InvalidParameter(_))
        ));
        assert!(matches!(
            decode_logits(&[0.0; 5], 1, 2, 3),
            Err(SegError::DimensionMismatch {
                expected: 6,
                actual: 5,
                ..
            })
        ));
        assert!(matches!(
            decode_logits(&[0.0, f32::NAN, 1.0, 2.0], 1, 2, 2),
            Err(SegError::NonFiniteInput { index: 1, .. })
        ));
        assert!(matches!(
            decode_logits(&[0.0, f32::INFINITY], 1, 1, 2),
            Err(SegError::NonFiniteInput { .. })
        ));
    }

    #[test]
    fn test_majority_filter_uniform_is_identity() {
        let raster = ClassRaster::new(5, 4, 6, vec![3; 20]).unwrap();
        let filtered = majority_filter(&raster, 3, MajorityTieBreak::LowestClass).unwrap();
        assert_eq!(filtered, raster);
        let filtered = majority_filter(&raster, 5, MajorityTieBreak::LastInScan).unwrap();
        assert_eq!(filtered, raster);
    }

    #[test]
    fn test_majority_filter_removes_isolated_pixel() {
        let raster =
            ClassRaster::from_rows(&[vec![2, 2, 2], vec![2, 1, 2], vec![2, 2, 2]], 3).unwrap();
        let filtered = majority_filter(&raster, 3, MajorityTieBreak::LowestClass).unwrap();
        assert_eq!(filtered.to_rows(), vec![vec![2; 3]; 3]);
    }

    #[test]
    fn test_majority_filter_excludes_out_of_bounds() {
        let raster =
            ClassRaster::from_rows(&[vec![1, 0, 0], vec![0, 0, 0], vec![0, 0, 0]], 2).unwrap();
        let filtered = majority_filter(&raster, 3, MajorityTieBreak::LowestClass).unwrap();
        assert_eq!(filtered.to_rows(), vec![vec![0; 3]; 3]);
    }

    #[test]
    fn test_majority_filter_tie_break_rules() {
        let raster = ClassRaster::from_rows(&[vec![1, 0, 0, 1]], 2).unwrap();

        let lowest = majority_filter(&raster, 3, MajorityTieBreak::LowestClass).unwrap();
        assert_eq!(lowest.to_rows(), vec![vec![0, 0, 0, 0]]);

        // x=3 sees [0, 1]: label 1 occurs last in the scan
        let last = majority_filter(&raster, 3, MajorityTieBreak::LastInScan).unwrap();
        assert_eq!(last.to_rows(), vec![vec![0, 0, 0, 1]]);
    }

    #[test]
    fn test_majority_filter_reads_raw_raster() {
        // Filtering in place would turn x=0 into 0 first, then x=1 would see
        // [0, 0, 1] and flip too, giving [0, 0, 0, 0]
        let raster = ClassRaster::from_rows(&[vec![1, 0, 1, 0]], 2).unwrap();
        let filtered = majority_filter(&raster, 3, MajorityTieBreak::LowestClass).unwrap();
        assert_eq!(filtered.to_rows(), vec![vec![0, 1, 0, 0]]);
        assert_eq!(raster.to_rows(), vec![vec![1, 0, 1, 0]]);
    }

    #[test]
    fn test_majority_filter_kernel_validation() {
        let raster = ClassRaster::new(2, 2, 2, vec![0; 4]).unwrap();
        assert!(majority_filter(&raster, 2, MajorityTieBreak::LowestClass).is_err());
        assert!(majority_filter(&raster, 0, MajorityTieBreak::LowestClass).is_err());
        assert_eq!(
            majority_filter(&raster, 1, MajorityTieBreak::LowestClass).unwrap(),
            raster
        );
        assert!(SegmentationDecoder::new(4, MajorityTieBreak::LowestClass).is_err());
    }

    #[test]
    fn test_decoder_golden_2x2() {
        // Class 0 wins at (0,0) and (1,1), class 1 elsewhere
        let logits = [2.0, 0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0];

        let raw = SegmentationDecoder::without_refinement()
            .decode(&logits, 2, 2, 2)
            .unwrap();
        assert_eq!(raw.to_rows(), vec![vec![0, 1], vec![1, 0]]);

        // Every 3x3 window covers the whole 2x2 grid: a 2-2 tie, class 0 wins
        let refined = SegmentationDecoder::default()
            .decode(&logits, 2, 2, 2)
            .unwrap();
        assert_eq!(refined.to_rows(), vec![vec![0, 0], vec![0, 0]]);
    }
}
