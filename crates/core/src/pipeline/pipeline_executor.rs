use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::pipeline::detect_signs_use_case::DetectSignsUseCase;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::publication::publication_adapter::PublicationAdapter;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Progress callback: `(frames_processed, total_frames)`, total 0 when
/// unknown. Returning `false` requests cancellation.
pub type ProgressCallback = Box<dyn Fn(usize, usize) -> bool + Send>;

/// Configuration for a pipeline execution run.
pub struct PipelineConfig {
    pub on_progress: Option<ProgressCallback>,
    pub cancelled: Arc<AtomicBool>,
    pub logger: Box<dyn PipelineLogger>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            logger: Box::new(NullPipelineLogger),
        }
    }
}

/// What a run did, reported once the source is exhausted or the run is
/// cancelled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: usize,
    /// Frames that failed to decode and were skipped.
    pub frames_dropped: usize,
    pub frames_without_detection: usize,
    /// Winning label counts; the no-detection sentinel is not included.
    pub detections: BTreeMap<String, usize>,
    pub publication_failures: usize,
    pub cancelled: bool,
}

/// Abstracts how the source → detect → publish loop is executed.
pub trait PipelineExecutor: Send {
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        use_case: DetectSignsUseCase,
        publication: PublicationAdapter,
        metadata: &SourceMetadata,
        config: PipelineConfig,
    ) -> Result<PipelineStats, Box<dyn std::error::Error>>;
}
