//! Point → first containing feature across classes.
//!
//! Classes are searched in a fixed priority order (water, land, vegetation,
//! road, building by default) and features in collection order; the first
//! polygon strictly containing the point wins. Points on a polygon boundary
//! are not contained. A label with no stored collection simply never matches.

use serde::{Deserialize, Serialize};

use crate::geo_core::GeoPoint;
use crate::geometric::features::{ClassFeatureCollection, PolygonFeature};
use crate::segmentation::palette::LandClass;

/// Matched feature and the class it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub label: String,
    /// Position of the feature in its collection
    pub index: usize,
    pub feature: PolygonFeature,
}

/// Serializable summary of a hit, for UI boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHitSummary {
    pub label: String,
    pub index: usize,
    pub class_index: Option<u8>,
    pub run_id: Option<u64>,
    pub row: Option<usize>,
    pub col: Option<usize>,
}

impl QueryHit {
    pub fn summary(&self) -> QueryHitSummary {
        QueryHitSummary {
            label: self.label.clone(),
            index: self.index,
            class_index: self.feature.properties.class_index,
            run_id: self.feature.properties.run_id,
            row: self.feature.properties.row,
            col: self.feature.properties.col,
        }
    }
}

/// `water, land, vegetation, road, building`
pub fn default_priority() -> Vec<String> {
    LandClass::VECTORIZED
        .iter()
        .map(|c| c.label().to_string())
        .collect()
}

/// Search order for `available` labels: those in `priority` first, in that
/// order, then the rest lexicographically
pub fn search_order<'a>(priority: &[String], available: &[&'a str]) -> Vec<&'a str> {
    let mut order: Vec<&'a str> = priority
        .iter()
        .filter_map(|p| available.iter().find(|a| **a == p.as_str()).copied())
        .collect();

    let mut rest: Vec<&'a str> = available
        .iter()
        .filter(|a| !priority.iter().any(|p| p.as_str() == **a))
        .copied()
        .collect();
    rest.sort_unstable();
    rest.dedup();

    order.dedup();
    order.extend(rest);
    order
}

/// Linear scan over `collections`
pub fn query(
    point: &GeoPoint,
    collections: &[ClassFeatureCollection],
    priority: &[String],
) -> Option<QueryHit> {
    let target = point.to_point();
    let labels: Vec<&str> = collections.iter().map(|c| c.label.as_str()).collect();

    for label in search_order(priority, &labels) {
        let Some(collection) = collections.iter().find(|c| c.label == label) else {
            continue;
        };
        if let Some((index, feature)) = collection.find_containing(&target) {
            return Some(QueryHit {
                label: label.to_string(),
                index,
                feature: feature.clone(),
            });
        }
    }
    None
}
