pub mod extractor;
pub mod feature_store;
pub mod features;
pub mod query;
pub mod spatial_index;

pub use extractor::{extract_cell_polygons, PolygonExtractor, Tessellation};
pub use feature_store::{BlobStore, DirectoryBlobStore, FeatureStore, MemoryBlobStore};
pub use features::{ClassFeatureCollection, FeatureProperties, PolygonFeature};
pub use query::{default_priority, query, QueryHit, QueryHitSummary};
pub use spatial_index::ClassQueryIndex;
