use crate::publication::domain::detection_publisher::PublicationError;
use crate::shared::frame::Frame;

/// An annotated frame in its wire representation.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: image::ImageFormat,
    pub frame_index: usize,
}

impl EncodedImage {
    /// Preferred file extension for the encoded format.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

/// Re-encodes frames into the representation subscribers expect.
pub trait FrameEncoder: Send {
    fn encode(&self, frame: &Frame) -> Result<EncodedImage, PublicationError>;
}
