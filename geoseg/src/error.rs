//! Error types for the numeric core (coordinates, decoding, rasters)

/// Result type alias
pub type Result<T> = std::result::Result<T, SegError>;

/// Errors raised by the coordinate transform and segmentation decoder.
///
/// Extraction and querying never fail on well-formed inputs; an empty mask or a
/// label that was never stored produce empty results instead of errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegError {
    /// Longitude/latitude outside the WGS84 domain, or a pole with no finite
    /// Web Mercator y
    #[error("Invalid coordinate: lon={lon}, lat={lat} ({reason})")]
    InvalidCoordinate {
        lon: f64,
        lat: f64,
        reason: &'static str,
    },

    /// Extent whose min is not strictly below its max on both axes
    #[error("Invalid extent [{min_lon}, {min_lat}, {max_lon}, {max_lat}]: min must be < max")]
    InvalidExtent {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },

    /// Buffer length does not match the declared dimensions
    #[error("Dimension mismatch: {what} expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// NaN or infinity where a finite number is required
    #[error("Non-finite input in {what} at index {index}")]
    NonFiniteInput { what: &'static str, index: usize },

    /// Parameter outside its accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
