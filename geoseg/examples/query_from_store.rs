// Query features persisted by a previous run.
// Usage: cargo run --example query_from_store -- <store dir> <lon> <lat>
use anyhow::{Context, Result};
use geoseg::geometric::{default_priority, query, DirectoryBlobStore, FeatureStore};
use geoseg::GeoPoint;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        anyhow::bail!("usage: {} <store dir> <lon> <lat>", args[0]);
    }
    let lon: f64 = args[2].parse().context("Invalid longitude")?;
    let lat: f64 = args[3].parse().context("Invalid latitude")?;
    let point = GeoPoint::new(lon, lat)?;

    let store = FeatureStore::new(DirectoryBlobStore::new(&args[1])?);
    let labels = store.labels()?;
    println!("Stored classes: {:?}", labels);

    let collections = store.load_all(&labels)?;
    match query(&point, &collections, &default_priority()) {
        Some(hit) => println!(
            "{} (feature {}): {}",
            hit.label,
            hit.index,
            serde_json::to_string(&hit.summary())?
        ),
        None => println!("No feature contains {:?}", point),
    }

    Ok(())
}
