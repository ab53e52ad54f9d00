use crate::detection::domain::candidate::Candidate;
use crate::shared::frame::Frame;

/// Draws a pass's candidates onto a copy of the frame.
///
/// Candidates are drawn in slice order, so later candidates land on top of
/// earlier ones. The input frame is never modified.
pub trait FrameAnnotator: Send {
    fn annotate(
        &self,
        frame: &Frame,
        candidates: &[Candidate],
    ) -> Result<Frame, Box<dyn std::error::Error>>;
}
