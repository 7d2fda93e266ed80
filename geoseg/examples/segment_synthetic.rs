// Run the whole pipeline on a synthetic tile with a stand-in model:
// water where the tile is blue, vegetation where it is green, land elsewhere.
use anyhow::Result;
use geoseg::geometric::DirectoryBlobStore;
use geoseg::segmentation::{InferenceBackend, LogitsLayout, LogitsTensor, ModelInput};
use geoseg::{Extent, GeoPoint, PipelineConfig, RunOutcome, SegmentationPipeline};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

/// Scores each pixel by its dominant channel, NCHW like a real model
struct ChannelBackend {
    num_classes: usize,
}

impl InferenceBackend for ChannelBackend {
    fn infer(&self, input: &ModelInput) -> Result<LogitsTensor> {
        let plane = input.height * input.width;
        let mut data = vec![0f32; self.num_classes * plane];
        for i in 0..plane {
            let (r, g, b) = (input.data[i], input.data[plane + i], input.data[2 * plane + i]);
            // water = 0, land = 1, vegetation = 2
            data[i] = 4.0 * (b - r.max(g));
            data[plane + i] = 0.5;
            data[2 * plane + i] = 4.0 * (g - r.max(b));
        }
        Ok(LogitsTensor::new(
            LogitsLayout::Nchw,
            input.height,
            input.width,
            self.num_classes,
            data,
        )?)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PipelineConfig::default();
    let output_path = PathBuf::from(&config.output_path).join("synthetic");
    let store = DirectoryBlobStore::new(output_path.join("store"))?;
    let backend = ChannelBackend {
        num_classes: config.num_classes,
    };
    let pipeline = SegmentationPipeline::new(config, backend, store)?;

    // La Rochelle harbour
    let extent = Extent::new(-1.152704, 46.181627, -1.139893, 46.18699)?;
    let tile = RgbImage::from_fn(512, 512, |x, y| {
        if x < 200 {
            Rgb([20, 60, 200])
        } else if y > 300 {
            Rgb([30, 180, 40])
        } else {
            Rgb([140, 120, 110])
        }
    });

    let ticket = pipeline.begin_selection(extent);
    let output = match pipeline.run(&ticket, &tile)? {
        RunOutcome::Completed(output) => output,
        RunOutcome::Superseded { latest, .. } => {
            println!("Run superseded by selection {}", latest);
            return Ok(());
        }
    };

    for collection in &output.collections {
        println!("{:>10}: {} polygons", collection.label, collection.len());
    }
    let written = output.write_outputs(&output_path)?;
    println!("Wrote {} files to {:?}", written.len(), output_path);

    let click = GeoPoint::new(-1.151, 46.185)?;
    match pipeline.query_point(&click)? {
        Some(hit) => println!("Click {:?} -> {} #{}", click, hit.label, hit.index),
        None => println!("Click {:?} -> no feature", click),
    }

    Ok(())
}
