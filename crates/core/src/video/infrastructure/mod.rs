pub mod channel_frame_source;
pub mod frame_decoder;
pub mod image_sequence_reader;
