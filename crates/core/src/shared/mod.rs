pub mod color;
pub mod constants;
pub mod frame;
pub mod luma_frame;
pub mod region;
pub mod source_metadata;
