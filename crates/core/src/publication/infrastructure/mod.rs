pub mod channel_publisher;
pub mod directory_publisher;
pub mod jpeg_frame_encoder;
