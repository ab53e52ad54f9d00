use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::arbitration::{ArbitrationEngine, DetectionResult};
use crate::detection::domain::candidate::Candidate;
use crate::detection::domain::detection_pass::{run_detection_pass, DetectorFailure, ExecutionMode};
use crate::detection::domain::detector_registry::SharedRegistry;
use crate::pipeline::pipeline_logger::{PipelineLogger, Stage};
use crate::shared::frame::Frame;

/// Everything one pass produced for one frame.
#[derive(Debug)]
pub struct FrameOutcome {
    pub annotated: Frame,
    pub result: DetectionResult,
    /// All candidates in registry order, winner included.
    pub candidates: Vec<Candidate>,
    pub failures: Vec<DetectorFailure>,
}

impl FrameOutcome {
    pub fn label(&self) -> &str {
        self.result.label()
    }
}

/// One detection pass: snapshot → luminance → fan-out → arbitrate → annotate.
///
/// Annotation and arbitration consume the same candidate list
/// independently; the annotated frame shows every candidate, not only the
/// winner.
pub struct DetectSignsUseCase {
    registry: SharedRegistry,
    arbiter: ArbitrationEngine,
    annotator: Box<dyn FrameAnnotator>,
    mode: ExecutionMode,
    /// Detectors already reported as failing; repeats are logged at debug.
    reported_failures: Mutex<HashSet<String>>,
}

impl DetectSignsUseCase {
    pub fn new(
        registry: SharedRegistry,
        arbiter: ArbitrationEngine,
        annotator: Box<dyn FrameAnnotator>,
    ) -> Self {
        Self {
            registry,
            arbiter,
            annotator,
            mode: ExecutionMode::default(),
            reported_failures: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Handle for toggling entries between passes.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn process(
        &self,
        frame: &Frame,
        logger: &mut dyn PipelineLogger,
    ) -> Result<FrameOutcome, Box<dyn std::error::Error>> {
        let snapshot = self.registry.snapshot()?;

        let t = Instant::now();
        let luma = frame.luminance();
        let pass = run_detection_pass(&snapshot, &luma, self.mode);
        logger.stage(Stage::Detect, elapsed_ms(t));
        self.report_failures(&pass.failures);

        let t = Instant::now();
        let result = self.arbiter.arbitrate(&pass.candidates);
        logger.stage(Stage::Arbitrate, elapsed_ms(t));

        let t = Instant::now();
        let annotated = self.annotator.annotate(frame, &pass.candidates)?;
        logger.stage(Stage::Annotate, elapsed_ms(t));

        Ok(FrameOutcome {
            annotated,
            result,
            candidates: pass.candidates,
            failures: pass.failures,
        })
    }

    fn report_failures(&self, failures: &[DetectorFailure]) {
        if failures.is_empty() {
            return;
        }
        let mut reported = match self.reported_failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for failure in failures {
            if reported.insert(failure.error.label().to_string()) {
                log::warn!(
                    "{}; its regions are skipped for this frame, repeats logged at debug level",
                    failure.error
                );
            } else {
                log::debug!("{}", failure.error);
            }
        }
    }
}

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
