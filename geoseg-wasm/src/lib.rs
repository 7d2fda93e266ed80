use geoseg::geo_core::{self, Extent, GeoPoint, ProjectedPoint};
use geoseg::geometric::{ClassFeatureCollection, ClassQueryIndex, PolygonExtractor};
use geoseg::segmentation::{
    class_mask_image, highlight_image, to_overlay_image, ClassRaster, LogitsLayout, LogitsTensor,
    MajorityTieBreak, Palette, SegmentationDecoder, HIGHLIGHT_RED,
};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Initialize the WASM module with panic hook
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Set panic hook for better error messages (alternative to init)
#[wasm_bindgen]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Decoded segmentation of one selection, kept in browser memory
#[wasm_bindgen]
pub struct WasmSegmentation {
    raster: ClassRaster,
    palette: Palette,
    collections: Vec<ClassFeatureCollection>,
    index: ClassQueryIndex,
}

/// Per-class statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClassCount {
    class_index: u8,
    label: String,
    pixels: usize,
    features: usize,
}

impl WasmSegmentation {
    #[allow(clippy::too_many_arguments)]
    fn build(
        logits: &[f32],
        height: usize,
        width: usize,
        num_classes: usize,
        nchw: bool,
        kernel_size: usize,
        extent: [f64; 4],
    ) -> Result<Self, String> {
        let layout = if nchw {
            LogitsLayout::Nchw
        } else {
            LogitsLayout::Hwc
        };
        let tensor = LogitsTensor::new(layout, height, width, num_classes, logits.to_vec())
            .map_err(|e| e.to_string())?
            .into_hwc();

        let decoder = if kernel_size == 0 {
            SegmentationDecoder::without_refinement()
        } else {
            SegmentationDecoder::new(kernel_size, MajorityTieBreak::LowestClass)
                .map_err(|e| e.to_string())?
        };
        let raster = decoder
            .decode(tensor.data(), height, width, num_classes)
            .map_err(|e| e.to_string())?;

        let palette = Palette::default();
        raster.check_palette(&palette).map_err(|e| e.to_string())?;

        let extent = Extent::try_from(extent).map_err(|e| e.to_string())?;
        let extractor = PolygonExtractor::new(extent);
        let priority = geoseg::geometric::default_priority();
        let collections: Vec<ClassFeatureCollection> = priority
            .iter()
            .filter_map(|label| palette.index_of(label).map(|i| (i, label)))
            .map(|(class_index, label)| extractor.extract_class(&raster, class_index, label))
            .collect();
        let index = ClassQueryIndex::new(collections.clone(), &priority);

        Ok(WasmSegmentation {
            raster,
            palette,
            collections,
            index,
        })
    }

    fn geojson_for(&self, label: &str) -> Result<Option<String>, String> {
        self.collections
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.to_geojson_string().map_err(|e| e.to_string()))
            .transpose()
    }

    fn query_json(&self, lon: f64, lat: f64) -> Result<Option<String>, String> {
        let point = GeoPoint::new(lon, lat).map_err(|e| e.to_string())?;
        let Some(hit) = self.index.query(&point) else {
            return Ok(None);
        };
        let feature = hit.feature.to_feature().map_err(|e| e.to_string())?;
        let json = serde_json::json!({
            "label": hit.label,
            "index": hit.index,
            "feature": feature,
        });
        Ok(Some(json.to_string()))
    }

    fn counts(&self) -> Vec<ClassCount> {
        self.raster
            .histogram()
            .into_iter()
            .enumerate()
            .map(|(i, pixels)| {
                let label = self.palette.label(i as u8).unwrap_or("").to_string();
                let features = self
                    .collections
                    .iter()
                    .find(|c| c.label == label)
                    .map(|c| c.len())
                    .unwrap_or(0);
                ClassCount {
                    class_index: i as u8,
                    label,
                    pixels,
                    features,
                }
            })
            .collect()
    }
}

#[wasm_bindgen]
impl WasmSegmentation {
    /// Decode model logits and extract per-class polygons
    ///
    /// # Arguments
    /// * `logits` - Float32Array, `[height, width, num_classes]` or `[1, num_classes, height, width]` when `nchw`
    /// * `kernel_size` - Majority filter size (odd), 0 to skip refinement
    /// * `min_lon`, `min_lat`, `max_lon`, `max_lat` - Selected extent (EPSG:4326)
    #[wasm_bindgen]
    #[allow(clippy::too_many_arguments)]
    pub fn from_logits(
        logits: &[f32],
        height: usize,
        width: usize,
        num_classes: usize,
        nchw: bool,
        kernel_size: usize,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<WasmSegmentation, JsValue> {
        let segmentation = Self::build(
            logits,
            height,
            width,
            num_classes,
            nchw,
            kernel_size,
            [min_lon, min_lat, max_lon, max_lat],
        )
        .map_err(js_err)?;

        web_sys::console::log_1(
            &format!(
                "Segmentation {}x{}: {} polygons",
                width,
                height,
                segmentation.index.len()
            )
            .into(),
        );
        Ok(segmentation)
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> usize {
        self.raster.width()
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> usize {
        self.raster.height()
    }

    /// RGBA overlay bytes (`height × width × 4`)
    #[wasm_bindgen]
    pub fn overlay_rgba(&self) -> Vec<u8> {
        to_overlay_image(&self.raster, &self.palette).into_raw()
    }

    /// Single-class RGBA layer in the class color
    #[wasm_bindgen]
    pub fn class_mask_rgba(&self, class_index: u8) -> Vec<u8> {
        class_mask_image(&self.raster, class_index, &self.palette).into_raw()
    }

    /// Red highlight layer for one class
    #[wasm_bindgen]
    pub fn highlight_rgba(&self, class_index: u8) -> Vec<u8> {
        highlight_image(&self.raster, class_index, HIGHLIGHT_RED).into_raw()
    }

    /// Class index at an image pixel
    #[wasm_bindgen]
    pub fn class_at(&self, x: usize, y: usize) -> Option<u8> {
        self.raster.get(x, y)
    }

    /// FeatureCollection JSON for a class label, `undefined` for unknown labels
    #[wasm_bindgen]
    pub fn class_geojson(&self, label: &str) -> Result<Option<String>, JsValue> {
        self.geojson_for(label).map_err(js_err)
    }

    /// First feature containing the point, as JSON `{label, index, feature}`,
    /// or `null`
    #[wasm_bindgen]
    pub fn query(&self, lon: f64, lat: f64) -> Result<JsValue, JsValue> {
        match self.query_json(lon, lat).map_err(js_err)? {
            Some(json) => Ok(JsValue::from_str(&json)),
            None => Ok(JsValue::NULL),
        }
    }

    /// Pixel and feature counts per class
    #[wasm_bindgen]
    pub fn class_counts(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.counts())
            .map_err(|e| JsValue::from_str(&format!("Serialization failed: {}", e)))
    }
}

/// EPSG:4326 → EPSG:3857, returns `[x, y]`
#[wasm_bindgen]
pub fn to_projected(lon: f64, lat: f64) -> Result<Vec<f64>, JsValue> {
    let p = geo_core::to_projected(&GeoPoint { lon, lat }).map_err(js_err)?;
    Ok(vec![p.x, p.y])
}

/// EPSG:3857 → EPSG:4326, returns `[lon, lat]`
#[wasm_bindgen]
pub fn to_geographic(x: f64, y: f64) -> Vec<f64> {
    let g = geo_core::to_geographic(&ProjectedPoint::new(x, y));
    vec![g.lon, g.lat]
}

/// Square selection from a projected drag, returns
/// `[min_lon, min_lat, max_lon, max_lat]`
#[wasm_bindgen]
pub fn square_extent(
    start_x: f64,
    start_y: f64,
    end_x: f64,
    end_y: f64,
) -> Result<Vec<f64>, JsValue> {
    let extent = Extent::square_from_corners(
        ProjectedPoint::new(start_x, start_y),
        ProjectedPoint::new(end_x, end_y),
    )
    .map_err(js_err)?;
    Ok(extent.to_array().to_vec())
}
