use serde::{Deserialize, Serialize};

use crate::error::{Result, SegError};

/// Semantic classes predicted by the segmentation model
/// Name        Code
/// Water         0
/// Land          1
/// Vegetation    2
/// Road          3
/// Building      4
/// Unknown       5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandClass {
    Water = 0,
    Land = 1,
    Vegetation = 2,
    Road = 3,
    Building = 4,
    Unknown = 5,
}

impl LandClass {
    /// Classes that get vector output, in query priority order
    pub const VECTORIZED: [LandClass; 5] = [
        LandClass::Water,
        LandClass::Land,
        LandClass::Vegetation,
        LandClass::Road,
        LandClass::Building,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Store key and feature label
    pub fn label(self) -> &'static str {
        match self {
            LandClass::Water => "water",
            LandClass::Land => "land",
            LandClass::Vegetation => "vegetation",
            LandClass::Road => "road",
            LandClass::Building => "building",
            LandClass::Unknown => "unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "water" => Some(LandClass::Water),
            "land" => Some(LandClass::Land),
            "vegetation" => Some(LandClass::Vegetation),
            "road" => Some(LandClass::Road),
            "building" => Some(LandClass::Building),
            "unknown" => Some(LandClass::Unknown),
            _ => None,
        }
    }
}

impl TryFrom<u8> for LandClass {
    type Error = SegError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(LandClass::Water),
            1 => Ok(LandClass::Land),
            2 => Ok(LandClass::Vegetation),
            3 => Ok(LandClass::Road),
            4 => Ok(LandClass::Building),
            5 => Ok(LandClass::Unknown),
            _ => Err(SegError::InvalidParameter(format!(
                "class index {} has no land class",
                code
            ))),
        }
    }
}

/// One palette slot: class label and its RGB color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub label: String,
    pub color: [u8; 3],
}

/// Class index → color/label table.
///
/// Immutable configuration passed explicitly to the overlay mapper and the
/// pipeline; entry `i` describes class index `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
    /// Class rendered fully transparent in overlays
    transparent_class: u8,
}

impl Palette {
    pub fn new(entries: Vec<PaletteEntry>, transparent_class: u8) -> Result<Self> {
        let palette = Palette {
            entries,
            transparent_class,
        };
        palette.validate()?;
        Ok(palette)
    }

    /// Check the table is non-empty, addressable by `u8` and holds the
    /// transparent class. Deserialized palettes go through this as well.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(SegError::InvalidParameter(
                "palette must have at least one entry".to_string(),
            ));
        }
        if self.entries.len() > u8::MAX as usize + 1 {
            return Err(SegError::InvalidParameter(format!(
                "palette has {} entries, at most 256 class indices are addressable",
                self.entries.len()
            )));
        }
        if self.transparent_class as usize >= self.entries.len() {
            return Err(SegError::InvalidParameter(format!(
                "transparent class {} is not in a palette of {} entries",
                self.transparent_class,
                self.entries.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn transparent_class(&self) -> u8 {
        self.transparent_class
    }

    pub fn entry(&self, class_index: u8) -> Option<&PaletteEntry> {
        self.entries.get(class_index as usize)
    }

    pub fn color(&self, class_index: u8) -> Option<[u8; 3]> {
        self.entry(class_index).map(|e| e.color)
    }

    pub fn label(&self, class_index: u8) -> Option<&str> {
        self.entry(class_index).map(|e| e.label.as_str())
    }

    /// Class index for a label, exact match
    pub fn index_of(&self, label: &str) -> Option<u8> {
        self.entries
            .iter()
            .position(|e| e.label == label)
            .map(|i| i as u8)
    }

    /// First class whose color is exactly `rgb`
    pub fn class_for_color(&self, rgb: [u8; 3]) -> Option<u8> {
        self.entries
            .iter()
            .position(|e| e.color == rgb)
            .map(|i| i as u8)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &PaletteEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i as u8, e))
    }
}

impl Default for Palette {
    fn default() -> Self {
        let entry = |class: LandClass, color: [u8; 3]| PaletteEntry {
            label: class.label().to_string(),
            color,
        };
        Palette {
            entries: vec![
                entry(LandClass::Water, [41, 169, 226]),
                entry(LandClass::Land, [246, 41, 132]),
                entry(LandClass::Vegetation, [228, 193, 110]),
                entry(LandClass::Road, [152, 16, 60]),
                entry(LandClass::Building, [58, 221, 254]),
                entry(LandClass::Unknown, [155, 155, 155]),
            ],
            transparent_class: LandClass::Water.index(),
        }
    }
}
