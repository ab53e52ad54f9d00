use crate::detection::domain::sensitivity::Sensitivity;
use crate::shared::luma_frame::LumaFrame;
use crate::shared::region::Region;

pub type DetectError = Box<dyn std::error::Error + Send + Sync>;

/// Domain interface for one class of region detector.
///
/// Detectors are stateless with respect to the stream (`&self`) and must be
/// shareable across worker threads, since a pass may fan out in parallel.
/// Returned regions must lie inside the frame.
pub trait RegionDetector: Send + Sync {
    fn detect(&self, frame: &LumaFrame, sensitivity: &Sensitivity)
        -> Result<Vec<Region>, DetectError>;
}
