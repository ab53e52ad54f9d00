use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::pipeline::detect_signs_use_case::{elapsed_ms, DetectSignsUseCase};
use crate::pipeline::pipeline_executor::{PipelineConfig, PipelineExecutor, PipelineStats};
use crate::pipeline::pipeline_logger::Stage;
use crate::publication::publication_adapter::PublicationAdapter;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_source::{FrameDecodeError, FrameSource};

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// A frame as read from the source, with its decode time in ms.
type DecodedFrame = (Result<Frame, FrameDecodeError>, f64);
/// Annotated frame and winning label, ready for publication.
type Publication = (Frame, String);

/// Executes the pipeline with dedicated threads for input and output.
///
/// Layout: `reader → main [detect/arbitrate/annotate] → publisher`
///
/// Passes run one frame at a time on the calling thread, triggered by frame
/// arrival. Decoding and publication overlap with detection.
pub struct ThreadedPipelineExecutor {
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        use_case: DetectSignsUseCase,
        publication: PublicationAdapter,
        metadata: &SourceMetadata,
        mut config: PipelineConfig,
    ) -> Result<PipelineStats, Box<dyn std::error::Error>> {
        let total_frames = metadata.total_frames.unwrap_or(0);
        let cap = self.channel_capacity;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<DecodedFrame>(cap);
        let (publish_tx, publish_rx) = crossbeam_channel::bounded::<Publication>(cap);

        let reader_handle = spawn_reader(source, frame_tx, config.cancelled.clone());
        let publisher_handle = spawn_publisher(publication, publish_rx);

        let mut stats = PipelineStats::default();
        let main_error = run_main_loop(
            frame_rx,
            &publish_tx,
            &use_case,
            total_frames,
            &mut config,
            &mut stats,
        );

        drop(publish_tx);
        stats.cancelled |= config.cancelled.load(Ordering::Relaxed);

        let (failures, publish_timings) =
            join_threads(reader_handle, publisher_handle, main_error)?;
        stats.publication_failures = failures;
        for ms in publish_timings {
            config.logger.stage(Stage::Publish, ms);
        }
        config.logger.summary();

        Ok(stats)
    }
}

fn spawn_reader(
    mut source: Box<dyn FrameSource>,
    frame_tx: Sender<DecodedFrame>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn FrameSource>> {
    std::thread::spawn(move || {
        {
            let mut frames = source.frames();
            loop {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let t = Instant::now();
                let Some(frame_result) = frames.next() else {
                    break;
                };
                if frame_tx.send((frame_result, elapsed_ms(t))).is_err() {
                    break;
                }
            }
        }
        source.close();
        source
    })
}

fn spawn_publisher(
    mut publication: PublicationAdapter,
    publish_rx: Receiver<Publication>,
) -> JoinHandle<(usize, Vec<f64>)> {
    std::thread::spawn(move || {
        let mut timings = Vec::new();
        for (frame, label) in publish_rx {
            let t = Instant::now();
            publication.publish(&frame, &label);
            timings.push(elapsed_ms(t));
        }
        (publication.finish(), timings)
    })
}

/// Runs one pass per arriving frame and forwards results to the publisher.
///
/// A result that completes after cancellation is discarded.
fn run_main_loop(
    frame_rx: Receiver<DecodedFrame>,
    publish_tx: &Sender<Publication>,
    use_case: &DetectSignsUseCase,
    total_frames: usize,
    config: &mut PipelineConfig,
    stats: &mut PipelineStats,
) -> Option<Box<dyn std::error::Error>> {
    for (decoded, decode_ms) in frame_rx {
        if config.cancelled.load(Ordering::Relaxed) {
            stats.cancelled = true;
            break;
        }
        config.logger.stage(Stage::Decode, decode_ms);

        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping frame: {e}");
                stats.frames_dropped += 1;
                config.logger.frame_dropped();
                continue;
            }
        };

        let outcome = match use_case.process(&frame, config.logger.as_mut()) {
            Ok(outcome) => outcome,
            Err(e) => return Some(e),
        };

        if config.cancelled.load(Ordering::Relaxed) {
            log::debug!("Discarding frame {} finished after cancellation", frame.index());
            stats.cancelled = true;
            break;
        }

        match outcome.result.winner() {
            Some(winner) => *stats.detections.entry(winner.label.clone()).or_default() += 1,
            None => stats.frames_without_detection += 1,
        }

        config.logger.frame_done(&outcome);
        let label = outcome.label().to_string();
        if publish_tx.send((outcome.annotated, label)).is_err() {
            return Some("Publisher channel closed unexpectedly".into());
        }

        stats.frames_processed += 1;
        config.logger.progress(stats.frames_processed, total_frames);

        if let Some(ref callback) = config.on_progress {
            if !callback(stats.frames_processed, total_frames) {
                config.cancelled.store(true, Ordering::Relaxed);
                stats.cancelled = true;
                break;
            }
        }
    }

    None
}

/// Joins both worker threads and coalesces the first error encountered.
fn join_threads(
    reader_handle: JoinHandle<Box<dyn FrameSource>>,
    publisher_handle: JoinHandle<(usize, Vec<f64>)>,
    mut first_error: Option<Box<dyn std::error::Error>>,
) -> Result<(usize, Vec<f64>), Box<dyn std::error::Error>> {
    fn set_if_none(
        slot: &mut Option<Box<dyn std::error::Error>>,
        err: Box<dyn std::error::Error>,
    ) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match reader_handle.join() {
        Ok(mut source) => source.close(),
        Err(_) => set_if_none(&mut first_error, "Reader thread panicked".into()),
    }

    let published = match publisher_handle.join() {
        Ok(result) => result,
        Err(_) => {
            set_if_none(&mut first_error, "Publisher thread panicked".into());
            (0, Vec::new())
        }
    };

    match first_error {
        Some(e) => Err(e),
        None => Ok(published),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use crate::annotation::domain::frame_annotator::FrameAnnotator;
    use crate::detection::domain::arbitration::ArbitrationEngine;
    use crate::detection::domain::candidate::Candidate;
    use crate::detection::domain::detector_registry::{
        DetectorEntry, DetectorRegistry, SharedRegistry,
    };
    use crate::detection::domain::region_detector::{DetectError, RegionDetector};
    use crate::detection::domain::sensitivity::Sensitivity;
    use crate::pipeline::pipeline_logger::StdoutPipelineLogger;
    use crate::publication::domain::detection_publisher::{
        DetectionPublisher, LabelMessage, PublicationError, Topic,
    };
    use crate::publication::domain::frame_encoder::{EncodedImage, FrameEncoder};
    use crate::shared::color::Rgb;
    use crate::shared::luma_frame::LumaFrame;
    use crate::shared::region::Region;

    // --- Stubs ---

    struct StubSource {
        frames: Vec<Result<Frame, FrameDecodeError>>,
        closed: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn new(frames: Vec<Result<Frame, FrameDecodeError>>) -> Self {
            Self {
                frames,
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FrameSource for StubSource {
        fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
            Ok(SourceMetadata {
                total_frames: Some(self.frames.len()),
                source_path: None,
            })
        }

        fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, FrameDecodeError>> + '_> {
            Box::new(self.frames.drain(..))
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Reports one region whenever the top-left pixel is bright.
    struct BrightCornerDetector;

    impl RegionDetector for BrightCornerDetector {
        fn detect(
            &self,
            frame: &LumaFrame,
            _sensitivity: &Sensitivity,
        ) -> Result<Vec<Region>, DetectError> {
            if frame.pixel(0, 0) > 128 {
                Ok(vec![Region::new(2, 2, 4, 4)])
            } else {
                Ok(vec![])
            }
        }
    }

    struct PassthroughAnnotator;

    impl FrameAnnotator for PassthroughAnnotator {
        fn annotate(
            &self,
            frame: &Frame,
            _candidates: &[Candidate],
        ) -> Result<Frame, Box<dyn std::error::Error>> {
            Ok(frame.clone())
        }
    }

    struct FailingAnnotator;

    impl FrameAnnotator for FailingAnnotator {
        fn annotate(
            &self,
            _frame: &Frame,
            _candidates: &[Candidate],
        ) -> Result<Frame, Box<dyn std::error::Error>> {
            Err("canvas unavailable".into())
        }
    }

    struct StubEncoder;

    impl FrameEncoder for StubEncoder {
        fn encode(&self, frame: &Frame) -> Result<EncodedImage, PublicationError> {
            Ok(EncodedImage {
                bytes: vec![],
                format: image::ImageFormat::Jpeg,
                frame_index: frame.index(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        images: Arc<Mutex<Vec<usize>>>,
        labels: Arc<Mutex<Vec<LabelMessage>>>,
        reject_labels: bool,
    }

    impl DetectionPublisher for RecordingPublisher {
        fn publish_image(&mut self, image: &EncodedImage) -> Result<(), PublicationError> {
            self.images.lock().unwrap().push(image.frame_index);
            Ok(())
        }

        fn publish_label(&mut self, message: &LabelMessage) -> Result<(), PublicationError> {
            if self.reject_labels {
                return Err(PublicationError::Disconnected {
                    topic: Topic::Label,
                });
            }
            self.labels.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn make_frame(index: usize, value: u8) -> Frame {
        Frame::new(vec![value; 16 * 16 * 3], 16, 16, 3, index)
    }

    fn decode_error(index: usize) -> FrameDecodeError {
        FrameDecodeError::Decode {
            index,
            source: image::ImageError::IoError(std::io::Error::other("truncated")),
        }
    }

    fn use_case(annotator: Box<dyn FrameAnnotator>) -> DetectSignsUseCase {
        let mut registry = DetectorRegistry::new();
        registry
            .register(DetectorEntry::new(
                "warning",
                "warning",
                Rgb::GREEN,
                Sensitivity::default(),
                Arc::new(BrightCornerDetector),
            ))
            .unwrap();
        DetectSignsUseCase::new(
            SharedRegistry::new(registry),
            ArbitrationEngine::default(),
            annotator,
        )
    }

    fn metadata(n: usize) -> SourceMetadata {
        SourceMetadata {
            total_frames: Some(n),
            source_path: None,
        }
    }

    fn labels_of(publisher: &Arc<Mutex<Vec<LabelMessage>>>) -> Vec<(usize, String)> {
        publisher
            .lock()
            .unwrap()
            .iter()
            .map(|m| (m.frame_index, m.label.clone()))
            .collect()
    }

    // --- Tests ---

    #[test]
    fn test_publishes_every_frame_in_order() {
        let frames = vec![
            Ok(make_frame(0, 200)),
            Ok(make_frame(1, 10)),
            Ok(make_frame(2, 200)),
        ];
        let source = StubSource::new(frames);
        let closed = source.closed.clone();
        let publisher = RecordingPublisher::default();
        let (images, labels) = (publisher.images.clone(), publisher.labels.clone());

        let stats = ThreadedPipelineExecutor::new()
            .execute(
                Box::new(source),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(Box::new(StubEncoder), Box::new(publisher)),
                &metadata(3),
                PipelineConfig::default(),
            )
            .unwrap();

        assert_eq!(*images.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(
            labels_of(&labels),
            vec![
                (0, "warning".to_string()),
                (1, "nothing".to_string()),
                (2, "warning".to_string()),
            ]
        );
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.frames_without_detection, 1);
        assert_eq!(stats.detections.get("warning"), Some(&2));
        assert_eq!(stats.publication_failures, 0);
        assert!(!stats.cancelled);
        assert!(closed.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_undecodable_frames_are_dropped() {
        let frames = vec![Ok(make_frame(0, 200)), Err(decode_error(1)), Ok(make_frame(2, 10))];
        let publisher = RecordingPublisher::default();
        let labels = publisher.labels.clone();

        let stats = ThreadedPipelineExecutor::new()
            .execute(
                Box::new(StubSource::new(frames)),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(Box::new(StubEncoder), Box::new(publisher)),
                &metadata(3),
                PipelineConfig::default(),
            )
            .unwrap();

        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_processed, 2);
        let indices: Vec<usize> = labels_of(&labels).into_iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_progress_callback_can_cancel() {
        let frames = (0..6).map(|i| Ok(make_frame(i, 200))).collect();
        let publisher = RecordingPublisher::default();
        let labels = publisher.labels.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();

        let config = PipelineConfig {
            on_progress: Some(Box::new(move |current, total| {
                seen_cb.lock().unwrap().push((current, total));
                current < 2
            })),
            ..PipelineConfig::default()
        };

        let stats = ThreadedPipelineExecutor::with_capacity(1)
            .execute(
                Box::new(StubSource::new(frames)),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(Box::new(StubEncoder), Box::new(publisher)),
                &metadata(6),
                config,
            )
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(labels_of(&labels).len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 6), (2, 6)]);
    }

    #[test]
    fn test_cancelled_before_start_publishes_nothing() {
        let frames = (0..3).map(|i| Ok(make_frame(i, 200))).collect();
        let publisher = RecordingPublisher::default();
        let labels = publisher.labels.clone();
        let config = PipelineConfig {
            cancelled: Arc::new(AtomicBool::new(true)),
            ..PipelineConfig::default()
        };

        let stats = ThreadedPipelineExecutor::new()
            .execute(
                Box::new(StubSource::new(frames)),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(Box::new(StubEncoder), Box::new(publisher)),
                &metadata(3),
                config,
            )
            .unwrap();

        assert_eq!(stats.frames_processed, 0);
        assert!(labels_of(&labels).is_empty());
    }

    #[test]
    fn test_external_cancel_keeps_label_log_consistent_with_images() {
        use crate::publication::infrastructure::directory_publisher::DirectoryPublisher;

        /// Raises the shared stop flag while processing the marked frame,
        /// as a shutdown signal arriving mid-pass would.
        struct StopOnMarker(Arc<AtomicBool>);

        impl RegionDetector for StopOnMarker {
            fn detect(
                &self,
                frame: &LumaFrame,
                _sensitivity: &Sensitivity,
            ) -> Result<Vec<Region>, DetectError> {
                if frame.pixel(0, 0) == 77 {
                    self.0.store(true, Ordering::SeqCst);
                }
                Ok(vec![Region::new(2, 2, 4, 4)])
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let mut registry = DetectorRegistry::new();
        registry
            .register(DetectorEntry::new(
                "stop",
                "stop",
                Rgb::GREEN,
                Sensitivity::default(),
                Arc::new(StopOnMarker(cancelled.clone())),
            ))
            .unwrap();
        let use_case = DetectSignsUseCase::new(
            SharedRegistry::new(registry),
            ArbitrationEngine::default(),
            Box::new(PassthroughAnnotator),
        );

        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            Ok(make_frame(0, 10)),
            Ok(make_frame(1, 10)),
            Ok(make_frame(2, 77)),
            Ok(make_frame(3, 10)),
        ];
        let config = PipelineConfig {
            cancelled,
            ..PipelineConfig::default()
        };

        let stats = ThreadedPipelineExecutor::with_capacity(1)
            .execute(
                Box::new(StubSource::new(frames)),
                use_case,
                PublicationAdapter::new(
                    Box::new(StubEncoder),
                    Box::new(DirectoryPublisher::create(dir.path()).unwrap()),
                ),
                &metadata(4),
                config,
            )
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.frames_processed, 2);
        let labels = std::fs::read_to_string(dir.path().join("labels.csv")).unwrap();
        assert_eq!(labels, "0,stop\n1,stop\n");
        assert!(dir.path().join("frame_000001.jpg").exists());
        assert!(!dir.path().join("frame_000002.jpg").exists());
    }

    #[test]
    fn test_publication_failures_are_counted_not_fatal() {
        let frames = (0..3).map(|i| Ok(make_frame(i, 10))).collect();
        let publisher = RecordingPublisher {
            reject_labels: true,
            ..Default::default()
        };
        let images = publisher.images.clone();

        let stats = ThreadedPipelineExecutor::new()
            .execute(
                Box::new(StubSource::new(frames)),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(Box::new(StubEncoder), Box::new(publisher)),
                &metadata(3),
                PipelineConfig::default(),
            )
            .unwrap();

        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.publication_failures, 3);
        assert_eq!(images.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_annotation_error_fails_run() {
        let frames = vec![Ok(make_frame(0, 200))];
        let result = ThreadedPipelineExecutor::new().execute(
            Box::new(StubSource::new(frames)),
            use_case(Box::new(FailingAnnotator)),
            PublicationAdapter::new(
                Box::new(StubEncoder),
                Box::new(RecordingPublisher::default()),
            ),
            &metadata(1),
            PipelineConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_logger_sees_every_stage_and_frame() {
        use crate::pipeline::detect_signs_use_case::FrameOutcome;
        use crate::pipeline::pipeline_logger::PipelineLogger;

        struct SharedLogger(Arc<Mutex<StdoutPipelineLogger>>);

        impl PipelineLogger for SharedLogger {
            fn progress(&mut self, processed: usize, total: usize) {
                self.0.lock().unwrap().progress(processed, total);
            }
            fn stage(&mut self, stage: Stage, duration_ms: f64) {
                self.0.lock().unwrap().stage(stage, duration_ms);
            }
            fn frame_done(&mut self, outcome: &FrameOutcome) {
                self.0.lock().unwrap().frame_done(outcome);
            }
            fn frame_dropped(&mut self) {
                self.0.lock().unwrap().frame_dropped();
            }
        }

        let inner = Arc::new(Mutex::new(StdoutPipelineLogger::new(10)));
        let config = PipelineConfig {
            logger: Box::new(SharedLogger(inner.clone())),
            ..PipelineConfig::default()
        };
        let frames = vec![Ok(make_frame(0, 200)), Err(decode_error(1)), Ok(make_frame(2, 10))];

        ThreadedPipelineExecutor::new()
            .execute(
                Box::new(StubSource::new(frames)),
                use_case(Box::new(PassthroughAnnotator)),
                PublicationAdapter::new(
                    Box::new(StubEncoder),
                    Box::new(RecordingPublisher::default()),
                ),
                &metadata(3),
                config,
            )
            .unwrap();

        let logger = inner.lock().unwrap();
        assert_eq!(logger.stage_stats(Stage::Decode).count, 3);
        assert_eq!(logger.stage_stats(Stage::Detect).count, 2);
        assert_eq!(logger.stage_stats(Stage::Publish).count, 2);
        assert_eq!(logger.frames(), 2);
        assert_eq!(logger.winners().get("warning"), Some(&1));
        assert!(logger.report().unwrap().contains("1 dropped"));
    }

    #[test]
    fn test_end_to_end_from_files_to_directory() {
        use crate::annotation::infrastructure::imageproc_annotator::ImageprocAnnotator;
        use crate::detection::infrastructure::haar_cascade::test_support::{
            bright_block_cascade, frame_with_blocks,
        };
        use crate::detection::infrastructure::registry_config::{EntryConfig, RegistryConfig};
        use crate::detection::infrastructure::registry_factory::build_registry;
        use crate::publication::infrastructure::directory_publisher::DirectoryPublisher;
        use crate::publication::infrastructure::jpeg_frame_encoder::JpegFrameEncoder;
        use crate::video::infrastructure::image_sequence_reader::ImageSequenceReader;

        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&frames_dir).unwrap();

        let cascade = dir.path().join("block.json");
        std::fs::write(&cascade, serde_json::to_string(&bright_block_cascade()).unwrap()).unwrap();

        for (name, blocks) in [("000.png", vec![(18, 18)]), ("001.png", vec![])] {
            let luma = frame_with_blocks(40, 40, &blocks);
            image::GrayImage::from_raw(40, 40, luma)
                .unwrap()
                .save(frames_dir.join(name))
                .unwrap();
        }

        let config = RegistryConfig {
            entries: vec![EntryConfig {
                label: "block".into(),
                caption: None,
                cascade,
                color: Rgb::new(255, 0, 0),
                enabled: true,
                scale_factor: 1.3,
                min_neighbors: 0,
                min_size: None,
            }],
        };
        let registry = SharedRegistry::new(build_registry(&config).unwrap());
        let use_case = DetectSignsUseCase::new(
            registry,
            ArbitrationEngine::default(),
            Box::new(ImageprocAnnotator::default()),
        );

        let mut source = ImageSequenceReader::new(&frames_dir);
        let metadata = source.open().unwrap();
        let publication = PublicationAdapter::new(
            Box::new(JpegFrameEncoder::default()),
            Box::new(DirectoryPublisher::create(&out_dir).unwrap()),
        );

        let stats = ThreadedPipelineExecutor::new()
            .execute(
                Box::new(source),
                use_case,
                publication,
                &metadata,
                PipelineConfig::default(),
            )
            .unwrap();

        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.detections.get("block"), Some(&1));
        assert_eq!(stats.frames_without_detection, 1);
        let labels = std::fs::read_to_string(out_dir.join("labels.csv")).unwrap();
        assert_eq!(labels, "0,block\n1,nothing\n");
        assert!(out_dir.join("frame_000000.jpg").exists());
        assert!(out_dir.join("frame_000001.jpg").exists());
    }
}
