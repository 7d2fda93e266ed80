//! Class rasters and single-class masks.
//!
//! Both are row-major grids with row 0 at the north edge of the extent they
//! are later mapped onto.

use crate::error::{Result, SegError};
use crate::segmentation::palette::Palette;

/// Largest class count addressable with `u8` cell values
pub const MAX_CLASSES: usize = u8::MAX as usize + 1;

/// Per-pixel class indices produced by one inference run.
///
/// Immutable once built; every cell is `< num_classes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRaster {
    width: usize,
    height: usize,
    num_classes: usize,
    data: Vec<u8>,
}

impl ClassRaster {
    /// Build a raster from row-major cells, validating size and class range
    pub fn new(width: usize, height: usize, num_classes: usize, data: Vec<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        if num_classes == 0 || num_classes > MAX_CLASSES {
            return Err(SegError::InvalidParameter(format!(
                "num_classes must be in 1..={}, got {}",
                MAX_CLASSES, num_classes
            )));
        }
        if data.len() != width * height {
            return Err(SegError::DimensionMismatch {
                what: "class raster cells",
                expected: width * height,
                actual: data.len(),
            });
        }
        if let Some(index) = data.iter().position(|&c| c as usize >= num_classes) {
            return Err(SegError::InvalidParameter(format!(
                "cell {} holds class {} but only {} classes exist",
                index, data[index], num_classes
            )));
        }

        Ok(ClassRaster {
            width,
            height,
            num_classes,
            data,
        })
    }

    /// Build from nested rows (`rows[y][x]`)
    pub fn from_rows(rows: &[Vec<u8>], num_classes: usize) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(SegError::DimensionMismatch {
                what: "raster row length",
                expected: width,
                actual: bad.len(),
            });
        }
        ClassRaster::new(width, height, num_classes, rows.concat())
    }

    /// Used by the decoder, whose output is in range by construction
    pub(crate) fn from_decoded(
        width: usize,
        height: usize,
        num_classes: usize,
        data: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(data.len(), width * height);
        ClassRaster {
            width,
            height,
            num_classes,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Row-major cells
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(self.width)
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.rows().map(|r| r.to_vec()).collect()
    }

    /// Binary mask of the cells holding `class_index`
    pub fn mask_for(&self, class_index: u8) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&c| c == class_index).collect(),
        }
    }

    /// Pixel count per class index (`num_classes` entries)
    pub fn histogram(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for &c in &self.data {
            counts[c as usize] += 1;
        }
        counts
    }

    /// Every class index the raster can hold must exist in `palette`
    pub fn check_palette(&self, palette: &Palette) -> Result<()> {
        if self.num_classes > palette.len() {
            return Err(SegError::DimensionMismatch {
                what: "palette entries for raster classes",
                expected: self.num_classes,
                actual: palette.len(),
            });
        }
        Ok(())
    }
}

/// Binary membership grid for one class. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize, data: Vec<bool>) -> Result<Self> {
        check_dimensions(width, height)?;
        if data.len() != width * height {
            return Err(SegError::DimensionMismatch {
                what: "mask cells",
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Mask {
            width,
            height,
            data,
        })
    }

    /// Build from `{0,1}` rows; any non-zero value counts as on
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(SegError::DimensionMismatch {
                what: "mask row length",
                expected: width,
                actual: bad.len(),
            });
        }
        let data = rows.iter().flatten().map(|&v| v != 0).collect();
        Mask::new(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_on(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[bool] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(SegError::InvalidParameter(format!(
            "raster dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_raster_from_rows() {
        let raster = ClassRaster::from_rows(&[vec![0, 1, 2], vec![2, 1, 0]], 3).unwrap();
        assert_eq!(raster.width(), 3);
        assert_eq!(raster.height(), 2);
        assert_eq!(raster.get(2, 0), Some(2));
        assert_eq!(raster.get(0, 1), Some(2));
        assert_eq!(raster.get(3, 0), None);
        assert_eq!(raster.to_rows(), vec![vec![0, 1, 2], vec![2, 1, 0]]);
    }

    #[test]
    fn test_class_raster_rejects_bad_input() {
        assert!(matches!(
            ClassRaster::new(2, 2, 3, vec![0, 1, 2]),
            Err(SegError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            ClassRaster::new(2, 1, 2, vec![0, 2]),
            Err(SegError::InvalidParameter(_))
        ));
        assert!(ClassRaster::new(0, 1, 2, vec![]).is_err());
        assert!(ClassRaster::from_rows(&[vec![0, 1], vec![0]], 2).is_err());
    }

    #[test]
    fn test_mask_and_histogram() {
        let raster = ClassRaster::from_rows(&[vec![0, 1], vec![1, 1]], 2).unwrap();
        assert_eq!(raster.histogram(), vec![1, 3]);

        let mask = raster.mask_for(1);
        assert!(!mask.is_on(0, 0));
        assert!(mask.is_on(1, 0));
        assert!(mask.is_on(0, 1));
        assert_eq!(mask.count_on(), 3);
        assert_eq!(mask.row(1), &[true, true]);

        assert_eq!(raster.mask_for(4).count_on(), 0);
    }

    #[test]
    fn test_check_palette() {
        let raster = ClassRaster::new(1, 1, 7, vec![6]).unwrap();
        assert!(raster.check_palette(&Palette::default()).is_err());
        let raster = ClassRaster::new(1, 1, 6, vec![5]).unwrap();
        assert!(raster.check_palette(&Palette::default()).is_ok());
    }
}
