use crate::shared::frame::Frame;
use crate::video::domain::frame_source::FrameDecodeError;

/// Decodes a compressed image (JPEG, PNG, ...) into an RGB frame.
pub fn decode_frame(bytes: &[u8], index: usize) -> Result<Frame, FrameDecodeError> {
    let img = image::load_from_memory(bytes)
        .map_err(|source| FrameDecodeError::Decode { index, source })?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}


#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;

    #[test]
    fn test_decodes_png_to_rgb() {
        let frame = decode_frame(&png_bytes(8, 6, [50, 100, 200]), 3).unwrap();
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 6);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 3);
        assert_eq!(&frame.data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_grayscale_input_is_expanded() {
        let img = image::GrayImage::from_pixel(4, 4, image::Luma([90]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let frame = decode_frame(&bytes, 0).unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(&frame.data()[..3], &[90, 90, 90]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_frame(b"definitely not an image", 9).unwrap_err();
        assert!(matches!(err, FrameDecodeError::Decode { index: 9, .. }));
    }

    #[test]
    fn test_empty_payload_is_decode_error() {
        assert!(decode_frame(&[], 0).is_err());
    }
}
