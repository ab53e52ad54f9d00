/// Label published when no enabled detector produced a region.
pub const NO_DETECTION_LABEL: &str = "nothing";

pub const DEFAULT_SCALE_FACTOR: f64 = 1.3;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Rectangle outline thickness in pixels.
pub const ANNOTATION_LINE_THICKNESS: u32 = 2;
/// Gap between a caption's baseline and the top edge of its rectangle.
pub const CAPTION_OFFSET: i32 = 5;
pub const CAPTION_SCALE: f32 = 24.0;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const LABELS_FILENAME: &str = "labels.csv";
