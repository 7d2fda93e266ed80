//! Binary mask → geo-referenced polygon features.
//!
//! Each on-cell `(x, y)` becomes the quad
//! `(x,y) → (x+1,y) → (x+1,y+1) → (x,y+1) → (x,y)` in pixel space, mapped
//! through the extent's affine pixel → lon/lat transform. Row 0 is north, so
//! rings come out clockwise in lon/lat. Corner coordinates are computed once
//! per grid line and shared by every cell on it.

use geo::{Coord, LineString, Polygon};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geo_core::Extent;
use crate::geometric::features::{ClassFeatureCollection, FeatureProperties, PolygonFeature};
use crate::segmentation::raster::{ClassRaster, Mask};

/// How on-cells are turned into polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tessellation {
    /// One unit quad per on-cell
    #[default]
    Cells,
    /// One rectangle per horizontal run of on-cells in a row
    RowRuns,
}

/// Raster-to-vector extractor bound to one extent and run
#[derive(Debug, Clone)]
pub struct PolygonExtractor {
    extent: Extent,
    tessellation: Tessellation,
    run_id: Option<u64>,
}

impl PolygonExtractor {
    pub fn new(extent: Extent) -> Self {
        PolygonExtractor {
            extent,
            tessellation: Tessellation::default(),
            run_id: None,
        }
    }

    pub fn with_tessellation(mut self, tessellation: Tessellation) -> Self {
        self.tessellation = tessellation;
        self
    }

    /// Tag every feature with the generation of the run producing it
    pub fn with_run_id(mut self, run_id: u64) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Polygons for every on-cell of `mask`. An all-off mask yields an empty
    /// collection.
    pub fn extract(
        &self,
        mask: &Mask,
        label: &str,
        class_index: Option<u8>,
    ) -> ClassFeatureCollection {
        let grid = GridLines::new(&self.extent, mask.width(), mask.height());
        let base = FeatureProperties {
            label: label.to_string(),
            class_index,
            run_id: self.run_id,
            ..FeatureProperties::default()
        };
        let tessellation = self.tessellation;
        let row_features = |y: usize| -> Vec<PolygonFeature> {
            match tessellation {
                Tessellation::Cells => cells_in_row(mask, &grid, y, &base),
                Tessellation::RowRuns => runs_in_row(mask, &grid, y, &base),
            }
        };

        #[cfg(feature = "rayon")]
        let rows: Vec<Vec<PolygonFeature>> = (0..mask.height())
            .into_par_iter()
            .map(row_features)
            .collect();

        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Vec<PolygonFeature>> = (0..mask.height()).map(row_features).collect();

        let features: Vec<PolygonFeature> = rows.into_iter().flatten().collect();
        log::debug!(
            "Extracted {} polygons for '{}' ({:?})",
            features.len(),
            label,
            tessellation
        );

        ClassFeatureCollection {
            label: label.to_string(),
            features,
        }
    }

    /// Mask `raster` for `class_index` and extract it
    pub fn extract_class(
        &self,
        raster: &ClassRaster,
        class_index: u8,
        label: &str,
    ) -> ClassFeatureCollection {
        self.extract(&raster.mask_for(class_index), label, Some(class_index))
    }
}

/// One unit-cell polygon per on-cell of `mask`, labelled `label`
pub fn extract_cell_polygons(mask: &Mask, extent: &Extent, label: &str) -> ClassFeatureCollection {
    PolygonExtractor::new(*extent).extract(mask, label, None)
}

/// Longitude of every column edge and latitude of every row edge
struct GridLines {
    lons: Vec<f64>,
    lats: Vec<f64>,
}

impl GridLines {
    fn new(extent: &Extent, width: usize, height: usize) -> Self {
        GridLines {
            lons: (0..=width)
                .map(|x| extent.lon_at(x as f64, width))
                .collect(),
            lats: (0..=height)
                .map(|y| extent.lat_at(y as f64, height))
                .collect(),
        }
    }

    /// Quad covering columns `x0..x1` of row `y`
    fn quad(&self, x0: usize, x1: usize, y: usize) -> Polygon<f64> {
        let (west, east) = (self.lons[x0], self.lons[x1]);
        let (north, south) = (self.lats[y], self.lats[y + 1]);
        let ring = vec![
            Coord { x: west, y: north },
            Coord { x: east, y: north },
            Coord { x: east, y: south },
            Coord { x: west, y: south },
            Coord { x: west, y: north },
        ];
        Polygon::new(LineString::new(ring), vec![])
    }
}

fn cells_in_row(
    mask: &Mask,
    grid: &GridLines,
    y: usize,
    base: &FeatureProperties,
) -> Vec<PolygonFeature> {
    mask.row(y)
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(x, _)| {
            PolygonFeature::new(
                grid.quad(x, x + 1, y),
                FeatureProperties {
                    row: Some(y),
                    col: Some(x),
                    ..base.clone()
                },
            )
        })
        .collect()
}

fn runs_in_row(
    mask: &Mask,
    grid: &GridLines,
    y: usize,
    base: &FeatureProperties,
) -> Vec<PolygonFeature> {
    let row = mask.row(y);
    let mut features = Vec::new();
    let mut x = 0;
    while x < row.len() {
        if !row[x] {
            x += 1;
            continue;
        }
        let start = x;
        while x < row.len() && row[x] {
            x += 1;
        }
        features.push(PolygonFeature::new(
            grid.quad(start, x, y),
            FeatureProperties {
                row: Some(y),
                col: Some(start),
                col_end: Some(x - 1),
                ..base.clone()
            },
        ));
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(feature: &PolygonFeature) -> Vec<(f64, f64)> {
        feature
            .polygon
            .exterior()
            .coords()
            .map(|c| (c.x, c.y))
            .collect()
    }

    #[test]
    fn test_empty_mask_yields_no_features() {
        let mask = Mask::from_rows(&[vec![0, 0], vec![0, 0]]).unwrap();
        let extent = Extent::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let collection = extract_cell_polygons(&mask, &extent, "water");
        assert!(collection.is_empty());
        assert_eq!(collection.label, "water");
    }

    #[test]
    fn test_saturated_mask_unit_squares() {
        let mask = Mask::from_rows(&[vec![1, 1], vec![1, 1]]).unwrap();
        let extent = Extent::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let collection = extract_cell_polygons(&mask, &extent, "land");
        assert_eq!(collection.len(), 4);
        assert_eq!(
            ring(&collection.features[0]),
            vec![(0.0, 2.0), (1.0, 2.0), (1.0, 1.0), (0.0, 1.0), (0.0, 2.0)]
        );
        assert_eq!(
            ring(&collection.features[3]),
            vec![(1.0, 1.0), (2.0, 1.0), (2.0, 0.0), (1.0, 0.0), (1.0, 1.0)]
        );
        for feature in &collection.features {
            assert_eq!(feature.label(), "land");
            assert_eq!(feature.polygon.exterior().0.len(), 5);
        }
    }

    #[test]
    fn test_cell_properties_and_order() {
        let raster = ClassRaster::from_rows(&[vec![0, 2, 2], vec![2, 0, 0]], 3).unwrap();
        let extent = Extent::new(-1.0, 45.0, 2.0, 47.0).unwrap();
        let collection = PolygonExtractor::new(extent)
            .with_run_id(3)
            .extract_class(&raster, 2, "vegetation");
        let cells: Vec<(Option<usize>, Option<usize>)> = collection
            .iter()
            .map(|f| (f.properties.row, f.properties.col))
            .collect();
        assert_eq!(
            cells,
            vec![(Some(0), Some(1)), (Some(0), Some(2)), (Some(1), Some(0))]
        );
        assert!(collection
            .iter()
            .all(|f| f.properties.run_id == Some(3) && f.properties.class_index == Some(2)));
    }

    #[test]
    fn test_row_runs_merge_horizontal_cells() {
        let mask = Mask::from_rows(&[vec![1, 1, 0, 1], vec![0, 0, 0, 0], vec![1, 1, 1, 1]]).unwrap();
        let extent = Extent::new(0.0, 0.0, 4.0, 3.0).unwrap();
        let collection = PolygonExtractor::new(extent)
            .with_tessellation(Tessellation::RowRuns)
            .extract(&mask, "road", Some(3));
        assert_eq!(collection.len(), 3);
        assert_eq!(
            ring(&collection.features[0]),
            vec![(0.0, 3.0), (2.0, 3.0), (2.0, 2.0), (0.0, 2.0), (0.0, 3.0)]
        );
        assert_eq!(collection.features[0].properties.col_end, Some(1));
        assert_eq!(collection.features[1].properties.col, Some(3));
        assert_eq!(collection.features[2].properties.col_end, Some(3));
        assert_eq!(collection.features[2].properties.row, Some(2));
    }
}
