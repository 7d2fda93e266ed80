use anyhow::Result;
use approx::assert_abs_diff_eq;
use geoseg::geometric::{
    default_priority, extract_cell_polygons, query, ClassFeatureCollection, DirectoryBlobStore,
    FeatureStore, MemoryBlobStore,
};
use geoseg::segmentation::{
    to_overlay_image, InferenceBackend, LogitsLayout, LogitsTensor, MajorityTieBreak, Mask,
    ModelInput, Palette, SegmentationDecoder,
};
use geoseg::{
    pixel_to_geo, to_geographic, to_projected, Extent, GeoPoint, PipelineConfig, RunOutcome,
    SegmentationPipeline,
};

/// 2×2 logits, 2 classes: class 0 at (0,0) and (1,1), class 1 elsewhere
const GOLDEN_LOGITS: [f32; 8] = [3.0, 1.0, 1.0, 3.0, 1.0, 3.0, 3.0, 1.0];

struct Unreachable;

impl InferenceBackend for Unreachable {
    fn infer(&self, _input: &ModelInput) -> Result<LogitsTensor> {
        anyhow::bail!("model not available")
    }
}

#[test]
fn test_golden_decode_both_tie_rules() {
    let raw = SegmentationDecoder::without_refinement()
        .decode(&GOLDEN_LOGITS, 2, 2, 2)
        .unwrap();
    assert_eq!(raw.to_rows(), vec![vec![0, 1], vec![1, 0]]);

    for tie_break in [MajorityTieBreak::LowestClass, MajorityTieBreak::LastInScan] {
        let refined = SegmentationDecoder::new(3, tie_break)
            .unwrap()
            .decode(&GOLDEN_LOGITS, 2, 2, 2)
            .unwrap();
        assert_eq!(refined.to_rows(), vec![vec![0, 0], vec![0, 0]], "{:?}", tie_break);
    }
}

#[test]
fn test_golden_pipeline_commits_refined_raster() {
    let config = PipelineConfig {
        num_classes: 2,
        vectorize: vec!["water".to_string(), "land".to_string()],
        ..PipelineConfig::default()
    };
    let pipeline = SegmentationPipeline::new(config, Unreachable, MemoryBlobStore::new()).unwrap();
    let extent = Extent::new(0.0, 0.0, 2.0, 2.0).unwrap();
    let ticket = pipeline.begin_selection(extent);

    let logits = LogitsTensor::new(LogitsLayout::Hwc, 2, 2, 2, GOLDEN_LOGITS.to_vec()).unwrap();
    let output = match pipeline.run_logits(&ticket, logits).unwrap() {
        RunOutcome::Completed(output) => output,
        other => panic!("unexpected outcome {:?}", other),
    };

    assert_eq!(output.raster.to_rows(), vec![vec![0, 0], vec![0, 0]]);
    // Water is the transparent class
    assert!(output.overlay.data().chunks(4).all(|px| px[3] == 0));

    let water = pipeline.store().get("water").unwrap().unwrap();
    assert_eq!(water.len(), 4);
    let first: Vec<(f64, f64)> = water.features[0]
        .polygon
        .exterior()
        .coords()
        .map(|c| (c.x, c.y))
        .collect();
    assert_eq!(
        first,
        vec![(0.0, 2.0), (1.0, 2.0), (1.0, 1.0), (0.0, 1.0), (0.0, 2.0)]
    );
    assert!(pipeline.store().get("land").unwrap().unwrap().is_empty());

    let hit = pipeline
        .query_point(&GeoPoint::new(1.5, 0.5).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(hit.label, "water");
    assert_eq!(hit.index, 3);
}

#[test]
fn test_inference_failure_propagates() {
    let pipeline =
        SegmentationPipeline::new(PipelineConfig::default(), Unreachable, MemoryBlobStore::new())
            .unwrap();
    let ticket = pipeline.begin_selection(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap());
    let err = pipeline
        .run(&ticket, &image::RgbImage::new(16, 16))
        .unwrap_err();
    assert!(format!("{:#}", err).contains("model not available"));
}

#[test]
fn test_mismatched_logits_are_rejected() {
    let pipeline =
        SegmentationPipeline::new(PipelineConfig::default(), Unreachable, MemoryBlobStore::new())
            .unwrap();
    let ticket = pipeline.begin_selection(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap());
    // The default model predicts six classes
    let logits = LogitsTensor::new(LogitsLayout::Hwc, 1, 1, 7, vec![0.0; 7]).unwrap();
    assert!(pipeline.run_logits(&ticket, logits).is_err());
    assert!(pipeline.store().labels().unwrap().is_empty());
}

#[test]
fn test_store_round_trip_on_disk_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let extent = Extent::new(-1.16, 46.17, -1.12, 46.21).unwrap();

    let water_mask = Mask::from_rows(&[vec![1, 1, 0], vec![1, 0, 0], vec![0, 0, 0]]).unwrap();
    let land_mask = Mask::from_rows(&[vec![1, 1, 1], vec![1, 1, 1], vec![1, 1, 1]]).unwrap();
    let water = extract_cell_polygons(&water_mask, &extent, "water");
    let land = extract_cell_polygons(&land_mask, &extent, "land");

    {
        let store = FeatureStore::new(DirectoryBlobStore::new(dir.path()).unwrap());
        store.put("water", &water).unwrap();
        store.put("land", &land).unwrap();
    }

    // Reopen: nothing lives in memory any more
    let store = FeatureStore::new(DirectoryBlobStore::new(dir.path()).unwrap());
    let loaded: Vec<ClassFeatureCollection> = store.load_all(&default_priority()).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], water);
    assert_eq!(loaded[1], land);

    // Inside both water and land: water wins
    let centre_nw = pixel_to_geo(0.5, 0.5, 3, 3, &extent);
    let hit = query(&centre_nw, &loaded, &default_priority()).unwrap();
    assert_eq!(hit.label, "water");

    let centre_se = pixel_to_geo(2.5, 2.5, 3, 3, &extent);
    let hit = query(&centre_se, &loaded, &default_priority()).unwrap();
    assert_eq!(hit.label, "land");
    assert_eq!(hit.index, 8);
}

#[test]
fn test_projection_round_trip_over_extent() {
    let extent = Extent::new(-1.152704, 46.181627, -1.139893, 46.18699).unwrap();
    for (px, py) in [(0.0, 0.0), (128.0, 64.0), (256.0, 256.0)] {
        let p = pixel_to_geo(px, py, 256, 256, &extent);
        let back = to_geographic(&to_projected(&p).unwrap());
        assert_abs_diff_eq!(back.lon, p.lon, epsilon = 1e-6);
        assert_abs_diff_eq!(back.lat, p.lat, epsilon = 1e-6);
    }
}

#[test]
fn test_overlay_from_default_palette() {
    let raster = SegmentationDecoder::without_refinement()
        .decode(&[0.0, 0.0, 5.0, 0.0, 0.0, 0.0], 1, 1, 6)
        .unwrap();
    let overlay = to_overlay_image(&raster, &Palette::default());
    assert_eq!(overlay.data(), &[228, 193, 110, 255]);
}
