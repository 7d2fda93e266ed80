pub mod decoder;
pub mod overlay;
pub mod palette;
pub mod preprocess;
pub mod raster;

pub use decoder::{
    argmax, decode_logits, majority_filter, softmax, MajorityTieBreak, SegmentationDecoder,
    DEFAULT_KERNEL_SIZE,
};
pub use overlay::{
    class_at_pixel, class_mask_image, highlight_image, to_overlay_image, RgbaOverlay,
    HIGHLIGHT_RED,
};
pub use palette::{LandClass, Palette, PaletteEntry};
pub use preprocess::{
    preprocess_tile, InferenceBackend, LogitsLayout, LogitsTensor, ModelInput, MODEL_INPUT_SIZE,
};
pub use raster::{ClassRaster, Mask, MAX_CLASSES};
