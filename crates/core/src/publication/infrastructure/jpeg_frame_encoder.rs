use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

use crate::publication::domain::detection_publisher::PublicationError;
use crate::publication::domain::frame_encoder::{EncodedImage, FrameEncoder};
use crate::shared::constants::DEFAULT_JPEG_QUALITY;
use crate::shared::frame::Frame;

/// Encodes RGB frames as baseline JPEG.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        let clamped = quality.clamp(1, 100);
        if clamped != quality {
            log::warn!("JPEG quality {quality} out of range, using {clamped}");
        }
        Self { quality: clamped }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &Frame) -> Result<EncodedImage, PublicationError> {
        let color = match frame.channels() {
            1 => ExtendedColorType::L8,
            _ => ExtendedColorType::Rgb8,
        };
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode(frame.data(), frame.width(), frame.height(), color)
            .map_err(|source| PublicationError::Encode {
                frame_index: frame.index(),
                source,
            })?;
        Ok(EncodedImage {
            bytes,
            format: ImageFormat::Jpeg,
            frame_index: frame.index(),
        })
    }
}
