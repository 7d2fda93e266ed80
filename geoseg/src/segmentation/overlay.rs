//! Class raster → RGBA overlay images

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::io::Cursor;
use std::path::Path;

use crate::segmentation::palette::Palette;
use crate::segmentation::raster::ClassRaster;

/// Default highlight color for the selected class
pub const HIGHLIGHT_RED: [u8; 4] = [255, 0, 0, 255];
/// Color used for class indices missing from the palette
const FALLBACK_COLOR: [u8; 4] = [0, 0, 0, 255];
const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Row-major RGBA buffer, `height × width × 4` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaOverlay {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbaOverlay {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn to_image(&self) -> Result<RgbaImage> {
        let width = u32::try_from(self.width).context("Overlay width exceeds u32")?;
        let height = u32::try_from(self.height).context("Overlay height exceeds u32")?;
        RgbaImage::from_raw(width, height, self.data.clone())
            .context("Overlay buffer does not match its dimensions")
    }

    /// PNG-encoded bytes
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = self.to_image()?;
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .context("Failed to encode overlay as PNG")?;
        Ok(bytes.into_inner())
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.to_image()?
            .save_with_format(path, ImageFormat::Png)
            .context(format!("Failed to write overlay PNG: {:?}", path))
    }
}

fn paint<F>(raster: &ClassRaster, color_of: F) -> RgbaOverlay
where
    F: Fn(u8) -> [u8; 4] + Sync,
{
    let mut data = vec![0u8; raster.width() * raster.height() * 4];

    #[cfg(feature = "rayon")]
    data.par_chunks_mut(4)
        .zip(raster.data().par_iter())
        .for_each(|(px, &class)| px.copy_from_slice(&color_of(class)));

    #[cfg(not(feature = "rayon"))]
    data.chunks_mut(4)
        .zip(raster.data().iter())
        .for_each(|(px, &class)| px.copy_from_slice(&color_of(class)));

    RgbaOverlay {
        width: raster.width(),
        height: raster.height(),
        data,
    }
}

/// Color every cell with its palette color. The palette's transparent class
/// gets alpha 0, every other class alpha 255.
pub fn to_overlay_image(raster: &ClassRaster, palette: &Palette) -> RgbaOverlay {
    let transparent = palette.transparent_class();
    paint(raster, |class| match palette.color(class) {
        Some([r, g, b]) => [r, g, b, if class == transparent { 0 } else { 255 }],
        None => FALLBACK_COLOR,
    })
}

/// Single-class layer: `class_index` in its palette color, everything else
/// transparent
pub fn class_mask_image(raster: &ClassRaster, class_index: u8, palette: &Palette) -> RgbaOverlay {
    let color = palette
        .color(class_index)
        .map(|[r, g, b]| [r, g, b, 255])
        .unwrap_or(FALLBACK_COLOR);
    highlight_image(raster, class_index, color)
}

/// Highlight layer: `class_index` in `color`, everything else transparent
pub fn highlight_image(raster: &ClassRaster, class_index: u8, color: [u8; 4]) -> RgbaOverlay {
    paint(raster, |class| {
        if class == class_index {
            color
        } else {
            TRANSPARENT
        }
    })
}

/// Class under an overlay pixel, by reverse palette lookup on its RGB value.
///
/// Alpha is ignored, so the transparent class is still recognised.
pub fn class_at_pixel(overlay: &RgbaOverlay, x: usize, y: usize, palette: &Palette) -> Option<u8> {
    let [r, g, b, _] = overlay.pixel(x, y)?;
    palette.class_for_color([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::palette::PaletteEntry;

    fn sample_raster() -> ClassRaster {
        ClassRaster::from_rows(&[vec![0, 1, 4], vec![5, 2, 3]], 6).unwrap()
    }

    #[test]
    fn test_overlay_colors_and_alpha() {
        let overlay = to_overlay_image(&sample_raster(), &Palette::default());
        assert_eq!(overlay.data().len(), 2 * 3 * 4);
        assert_eq!(overlay.pixel(0, 0), Some([41, 169, 226, 0]));
        assert_eq!(overlay.pixel(1, 0), Some([246, 41, 132, 255]));
        assert_eq!(overlay.pixel(2, 0), Some([58, 221, 254, 255]));
        assert_eq!(overlay.pixel(0, 1), Some([155, 155, 155, 255]));
        assert_eq!(overlay.pixel(3, 0), None);
    }

    #[test]
    fn test_overlay_custom_transparent_class() {
        let entries = vec![
            PaletteEntry {
                label: "a".to_string(),
                color: [1, 2, 3],
            },
            PaletteEntry {
                label: "b".to_string(),
                color: [4, 5, 6],
            },
        ];
        let palette = Palette::new(entries, 1).unwrap();
        let raster = ClassRaster::from_rows(&[vec![0, 1]], 2).unwrap();
        let overlay = to_overlay_image(&raster, &palette);
        assert_eq!(overlay.pixel(0, 0), Some([1, 2, 3, 255]));
        assert_eq!(overlay.pixel(1, 0), Some([4, 5, 6, 0]));
    }

    #[test]
    fn test_overlay_unknown_index_is_opaque_black() {
        let entries = vec![PaletteEntry {
            label: "only".to_string(),
            color: [9, 9, 9],
        }];
        let palette = Palette::new(entries, 0).unwrap();
        let raster = ClassRaster::from_rows(&[vec![0, 1]], 2).unwrap();
        let overlay = to_overlay_image(&raster, &palette);
        assert_eq!(overlay.pixel(1, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_class_mask_and_highlight() {
        let raster = sample_raster();
        let mask = class_mask_image(&raster, 4, &Palette::default());
        assert_eq!(mask.pixel(2, 0), Some([58, 221, 254, 255]));
        assert_eq!(mask.pixel(0, 0), Some([0, 0, 0, 0]));

        let highlight = highlight_image(&raster, 2, HIGHLIGHT_RED);
        assert_eq!(highlight.pixel(1, 1), Some(HIGHLIGHT_RED));
        assert_eq!(highlight.pixel(2, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_class_at_pixel() {
        let palette = Palette::default();
        let overlay = to_overlay_image(&sample_raster(), &palette);
        assert_eq!(class_at_pixel(&overlay, 0, 0, &palette), Some(0));
        assert_eq!(class_at_pixel(&overlay, 2, 1, &palette), Some(3));
        assert_eq!(class_at_pixel(&overlay, 9, 9, &palette), None);
    }

    #[test]
    fn test_encode_png_signature() {
        let overlay = to_overlay_image(&sample_raster(), &Palette::default());
        let png = overlay.encode_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 0).0, [246, 41, 132, 255]);
    }
}
