use crate::publication::domain::detection_publisher::{DetectionPublisher, LabelMessage};
use crate::publication::domain::frame_encoder::FrameEncoder;
use crate::shared::frame::Frame;

/// Turns one frame's pipeline output into the two publisher emissions.
///
/// Failures are logged and counted, never propagated: the pipeline's
/// responsibility ends at handing off a well-formed pair.
pub struct PublicationAdapter {
    encoder: Box<dyn FrameEncoder>,
    publisher: Box<dyn DetectionPublisher>,
    failures: usize,
}

impl PublicationAdapter {
    pub fn new(encoder: Box<dyn FrameEncoder>, publisher: Box<dyn DetectionPublisher>) -> Self {
        Self {
            encoder,
            publisher,
            failures: 0,
        }
    }

    /// Publishes the annotated image and the label. Returns how many of the
    /// two emissions failed.
    pub fn publish(&mut self, annotated: &Frame, label: &str) -> usize {
        let mut failed = 0;

        let image = self
            .encoder
            .encode(annotated)
            .and_then(|encoded| self.publisher.publish_image(&encoded));
        if let Err(e) = image {
            log::warn!("Frame {}: image not published: {e}", annotated.index());
            failed += 1;
        }

        let message = LabelMessage {
            frame_index: annotated.index(),
            label: label.to_string(),
        };
        if let Err(e) = self.publisher.publish_label(&message) {
            log::warn!("Frame {}: label not published: {e}", annotated.index());
            failed += 1;
        }

        self.failures += failed;
        failed
    }

    /// Total failed emissions so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Flushes the publisher; a failed flush counts as one failure.
    pub fn finish(&mut self) -> usize {
        if let Err(e) = self.publisher.flush() {
            log::warn!("Publisher flush failed: {e}");
            self.failures += 1;
        }
        self.failures
    }
}
