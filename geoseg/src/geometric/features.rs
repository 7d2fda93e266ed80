use anyhow::{bail, Context, Result};
use geo::{Contains, Coord, LineString, Point, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Properties carried by every extracted feature
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureProperties {
    /// Class label (also the store key of the owning collection)
    #[serde(default)]
    pub label: String,
    /// Class index in the palette
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_index: Option<u8>,
    /// Generation of the run that produced the feature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
    /// Raster row of the cell (row 0 = north)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// First raster column covered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<usize>,
    /// Last raster column covered, for merged row runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_end: Option<usize>,
}

/// One polygon tagged with its class and run
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature {
    pub polygon: Polygon<f64>,
    pub properties: FeatureProperties,
}

impl PolygonFeature {
    pub fn new(polygon: Polygon<f64>, properties: FeatureProperties) -> Self {
        PolygonFeature {
            polygon,
            properties,
        }
    }

    pub fn label(&self) -> &str {
        &self.properties.label
    }

    /// Boundary-exclusive point-in-polygon test
    pub fn contains(&self, point: &Point<f64>) -> bool {
        self.polygon.contains(point)
    }

    pub fn to_feature(&self) -> Result<Feature> {
        let mut rings = Vec::with_capacity(1 + self.polygon.interiors().len());
        rings.push(ring_to_positions(self.polygon.exterior()));
        rings.extend(self.polygon.interiors().iter().map(ring_to_positions));

        let properties = match serde_json::to_value(&self.properties)
            .context("Failed to serialize feature properties")?
        {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        };

        Ok(Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Polygon(rings))),
            id: None,
            properties,
            foreign_members: None,
        })
    }

    /// Parse a polygon feature. Rings keep their vertex order and winding.
    pub fn from_feature(feature: &Feature) -> Result<Self> {
        let geometry = feature
            .geometry
            .as_ref()
            .context("Feature has no geometry")?;

        let rings = match &geometry.value {
            Value::Polygon(rings) => rings,
            _ => bail!("Expected a Polygon geometry"),
        };

        let mut rings = rings.iter().map(|r| positions_to_ring(r));
        let exterior = rings.next().context("Polygon has no exterior ring")??;
        let interiors = rings.collect::<Result<Vec<_>>>()?;

        let properties = match &feature.properties {
            Some(map) => serde_json::from_value(serde_json::Value::Object(map.clone()))
                .context("Failed to parse feature properties")?,
            None => FeatureProperties::default(),
        };

        Ok(PolygonFeature {
            polygon: Polygon::new(exterior, interiors),
            properties,
        })
    }
}

fn ring_to_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn positions_to_ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    if positions.len() < 4 {
        bail!(
            "Polygon ring needs at least 4 positions, found {}",
            positions.len()
        );
    }
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [lon, lat, ..] if lon.is_finite() && lat.is_finite() => Ok(Coord { x: *lon, y: *lat }),
            _ => bail!("Invalid position {:?}", p),
        })
        .collect::<Result<Vec<_>>>()?;
    if coords.first() != coords.last() {
        bail!("Polygon ring is not closed");
    }
    Ok(LineString::new(coords))
}

/// All polygons extracted for one class in one run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassFeatureCollection {
    /// Class label, the store key
    pub label: String,
    pub features: Vec<PolygonFeature>,
}

impl ClassFeatureCollection {
    pub fn new(label: impl Into<String>) -> Self {
        ClassFeatureCollection {
            label: label.into(),
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: PolygonFeature) {
        self.features.push(feature);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolygonFeature> {
        self.features.iter()
    }

    /// First feature, in collection order, containing `point`
    pub fn find_containing(&self, point: &Point<f64>) -> Option<(usize, &PolygonFeature)> {
        self.features
            .iter()
            .enumerate()
            .find(|(_, f)| f.contains(point))
    }

    pub fn to_feature_collection(&self) -> Result<FeatureCollection> {
        let features = self
            .features
            .iter()
            .map(PolygonFeature::to_feature)
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    pub fn to_geojson(&self) -> Result<GeoJson> {
        Ok(GeoJson::from(self.to_feature_collection()?))
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(self.to_geojson()?.to_string())
    }

    /// Parse a collection stored under `label`. Features without a label
    /// property inherit it.
    pub fn from_feature_collection(label: &str, collection: &FeatureCollection) -> Result<Self> {
        let features = collection
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let mut feature = PolygonFeature::from_feature(f)
                    .context(format!("Invalid feature {} in '{}'", i, label))?;
                if feature.properties.label.is_empty() {
                    feature.properties.label = label.to_string();
                }
                Ok(feature)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ClassFeatureCollection {
            label: label.to_string(),
            features,
        })
    }

    pub fn from_geojson_str(label: &str, text: &str) -> Result<Self> {
        let geojson: GeoJson = text
            .parse()
            .context(format!("Failed to parse GeoJSON for '{}'", label))?;
        match geojson {
            GeoJson::FeatureCollection(fc) => Self::from_feature_collection(label, &fc),
            _ => bail!("GeoJSON for '{}' is not a FeatureCollection", label),
        }
    }

    /// Write `{dir}/{name}.geojson`; `name` defaults to the label
    pub fn to_geojson_file(&self, dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create output directory: {:?}", dir))?;
        let name = name.unwrap_or(&self.label);
        let output_file = dir.join(format!("{}.geojson", name));
        std::fs::write(&output_file, self.to_geojson_string()?)
            .context(format!("Failed to write GeoJSON file: {:?}", output_file))?;
        Ok(output_file)
    }
}
