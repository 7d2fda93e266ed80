//! R-tree accelerated class query.
//!
//! Polygon envelopes go into one R-tree; a lookup collects the envelopes
//! covering the point, keeps the polygons that really contain it and returns
//! the one with the smallest (class rank, feature index). That is exactly the
//! feature the linear scan in [`crate::geometric::query`] would return.

use geo::BoundingRect;
use rstar::{RTree, RTreeObject, AABB};

use crate::geo_core::GeoPoint;
use crate::geometric::features::ClassFeatureCollection;
use crate::geometric::query::{search_order, QueryHit};

/// Envelope of one feature, addressed by class rank and feature index
#[derive(Debug, Clone)]
struct IndexedPolygon {
    rank: usize,
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Query index over the collections of one run
#[derive(Debug, Clone)]
pub struct ClassQueryIndex {
    tree: RTree<IndexedPolygon>,
    /// Collections sorted by search rank
    collections: Vec<ClassFeatureCollection>,
}

impl ClassQueryIndex {
    pub fn new(collections: Vec<ClassFeatureCollection>, priority: &[String]) -> Self {
        let ordered_labels: Vec<String> = {
            let labels: Vec<&str> = collections.iter().map(|c| c.label.as_str()).collect();
            search_order(priority, &labels)
                .into_iter()
                .map(str::to_string)
                .collect()
        };

        let mut pool: Vec<Option<ClassFeatureCollection>> =
            collections.into_iter().map(Some).collect();
        let collections: Vec<ClassFeatureCollection> = ordered_labels
            .iter()
            .filter_map(|label| {
                pool.iter_mut()
                    .find(|c| c.as_ref().map(|c| &c.label) == Some(label))
                    .and_then(Option::take)
            })
            .collect();

        let mut entries = Vec::new();
        for (rank, collection) in collections.iter().enumerate() {
            for (index, feature) in collection.features.iter().enumerate() {
                if let Some(rect) = feature.polygon.bounding_rect() {
                    entries.push(IndexedPolygon {
                        rank,
                        index,
                        envelope: AABB::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                    });
                }
            }
        }

        log::debug!(
            "Built query index over {} polygons in {} classes",
            entries.len(),
            collections.len()
        );

        ClassQueryIndex {
            tree: RTree::bulk_load(entries),
            collections,
        }
    }

    /// Number of indexed polygons
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Class labels in search order
    pub fn labels(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn collection(&self, label: &str) -> Option<&ClassFeatureCollection> {
        self.collections.iter().find(|c| c.label == label)
    }

    pub fn query(&self, point: &GeoPoint) -> Option<QueryHit> {
        let target = point.to_point();
        let probe = AABB::from_point([point.lon, point.lat]);

        let (rank, index) = self
            .tree
            .locate_in_envelope_intersecting(&probe)
            .filter(|e| self.collections[e.rank].features[e.index].contains(&target))
            .map(|e| (e.rank, e.index))
            .min()?;

        let collection = &self.collections[rank];
        Some(QueryHit {
            label: collection.label.clone(),
            index,
            feature: collection.features[index].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::Extent;
    use crate::geometric::extractor::PolygonExtractor;
    use crate::geometric::query::{default_priority, query};
    use crate::segmentation::palette::Palette;
    use crate::segmentation::raster::ClassRaster;

    fn run_collections() -> Vec<ClassFeatureCollection> {
        let raster = ClassRaster::from_rows(
            &[
                vec![0, 0, 1, 2, 4],
                vec![0, 3, 3, 3, 4],
                vec![1, 1, 2, 2, 5],
                vec![4, 4, 0, 1, 5],
            ],
            6,
        )
        .unwrap();
        let extent = Extent::new(2.0, 48.0, 2.5, 48.4).unwrap();
        let extractor = PolygonExtractor::new(extent);
        let palette = Palette::default();
        (0..6u8)
            .map(|c| extractor.extract_class(&raster, c, palette.label(c).unwrap_or("")))
            .collect()
    }

    #[test]
    fn test_index_matches_linear_scan() {
        let collections = run_collections();
        let priority = default_priority();
        let index = ClassQueryIndex::new(collections.clone(), &priority);
        assert_eq!(index.len(), 20);

        let mut lon = 1.95;
        while lon < 2.55 {
            let mut lat = 47.95;
            while lat < 48.45 {
                let point = GeoPoint::new(lon, lat).unwrap();
                assert_eq!(
                    index.query(&point),
                    query(&point, &collections, &priority),
                    "mismatch at {:?}",
                    point
                );
                lat += 0.0173;
            }
            lon += 0.0211;
        }
    }

    #[test]
    fn test_index_overlap_priority() {
        let palette = Palette::default();
        let extent = Extent::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let full = ClassRaster::new(1, 1, 6, vec![1]).unwrap();
        let land = PolygonExtractor::new(extent).extract_class(&full, 1, palette.label(1).unwrap());
        let mut water = land.clone();
        water.label = "water".to_string();

        let index = ClassQueryIndex::new(vec![land, water], &default_priority());
        assert_eq!(index.labels(), vec!["water", "land"]);
        let hit = index.query(&GeoPoint::new(0.5, 0.5).unwrap()).unwrap();
        assert_eq!(hit.label, "water");
    }

    #[test]
    fn test_empty_index() {
        let index = ClassQueryIndex::new(Vec::new(), &default_priority());
        assert!(index.is_empty());
        assert!(index.query(&GeoPoint::new(0.0, 0.0).unwrap()).is_none());
    }
}
