pub mod annotation;
pub mod detection;
pub mod pipeline;
pub mod publication;
pub mod shared;
pub mod video;
