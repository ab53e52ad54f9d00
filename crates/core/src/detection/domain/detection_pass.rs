use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::detection::domain::candidate::Candidate;
use crate::detection::domain::detector_registry::{ActiveEntry, RegistrySnapshot};
use crate::shared::luma_frame::LumaFrame;
use crate::shared::region::Region;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorInvocationError {
    #[error("detector '{label}' failed: {message}")]
    Failed { label: String, message: String },
    #[error("detector '{label}' panicked: {message}")]
    Panicked { label: String, message: String },
}

impl DetectorInvocationError {
    pub fn label(&self) -> &str {
        match self {
            DetectorInvocationError::Failed { label, .. }
            | DetectorInvocationError::Panicked { label, .. } => label,
        }
    }
}

/// A detector whose contribution was dropped for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorFailure {
    pub order_index: usize,
    pub error: DetectorInvocationError,
}

/// How detectors within one pass are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// One scoped thread per enabled entry. Results are still merged in
    /// registry order.
    Parallel,
}

/// Everything one pass produced, in registry order.
#[derive(Debug, Default)]
pub struct PassOutput {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<DetectorFailure>,
}

/// Invokes every entry of the snapshot on the shared luminance frame.
///
/// A failing or panicking detector contributes nothing for this frame; the
/// remaining entries still run. Regions are clipped to the frame, and those
/// left with no area never become candidates.
pub fn run_detection_pass(
    snapshot: &RegistrySnapshot,
    frame: &LumaFrame,
    mode: ExecutionMode,
) -> PassOutput {
    let results: Vec<Result<Vec<Region>, DetectorInvocationError>> = match mode {
        ExecutionMode::Sequential => snapshot
            .entries()
            .iter()
            .map(|entry| invoke(entry, frame))
            .collect(),
        ExecutionMode::Parallel => std::thread::scope(|scope| {
            let handles: Vec<_> = snapshot
                .entries()
                .iter()
                .map(|entry| (entry, scope.spawn(move || invoke(entry, frame))))
                .collect();
            handles
                .into_iter()
                .map(|(entry, handle)| {
                    handle.join().unwrap_or_else(|payload| {
                        Err(DetectorInvocationError::Panicked {
                            label: entry.label.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    })
                })
                .collect()
        }),
    };

    let mut output = PassOutput::default();
    for (entry, result) in snapshot.entries().iter().zip(results) {
        match result {
            Ok(regions) => {
                for raw in regions {
                    let Some(region) = raw.clamp_to(frame.width(), frame.height()) else {
                        log::debug!("Detector '{}' returned unusable region {raw:?}", entry.label);
                        continue;
                    };
                    output.candidates.push(Candidate {
                        label: entry.label.clone(),
                        caption: entry.caption.clone(),
                        color: entry.color,
                        region,
                        order_index: entry.order_index,
                    });
                }
            }
            Err(error) => {
                log::debug!("{error}; skipping its regions for this frame");
                output.failures.push(DetectorFailure {
                    order_index: entry.order_index,
                    error,
                });
            }
        }
    }
    output
}

thread_local! {
    static IN_DETECTOR: Cell<bool> = const { Cell::new(false) };
}

/// Chains a panic hook that stays silent for panics raised inside a
/// detector invocation. Those already surface as
/// [`DetectorInvocationError::Panicked`]; every other panic still reaches
/// the previous hook.
pub fn install_detector_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if !IN_DETECTOR.with(Cell::get) {
            previous(info);
        }
    }));
}

fn invoke(entry: &ActiveEntry, frame: &LumaFrame) -> Result<Vec<Region>, DetectorInvocationError> {
    IN_DETECTOR.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        entry.detector.detect(frame, &entry.sensitivity)
    }));
    IN_DETECTOR.with(|flag| flag.set(false));
    match outcome {
        Ok(Ok(regions)) => Ok(regions),
        Ok(Err(e)) => Err(DetectorInvocationError::Failed {
            label: entry.label.clone(),
            message: e.to_string(),
        }),
        Err(payload) => Err(DetectorInvocationError::Panicked {
            label: entry.label.clone(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use rstest::rstest;

    use crate::detection::domain::detector_registry::{DetectorEntry, DetectorRegistry};
    use crate::detection::domain::region_detector::{DetectError, RegionDetector};
    use crate::detection::domain::sensitivity::Sensitivity;
    use crate::shared::color::Rgb;

    struct FixedDetector {
        regions: Vec<Region>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedDetector {
        fn new(regions: Vec<Region>) -> Self {
            Self {
                regions,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RegionDetector for FixedDetector {
        fn detect(
            &self,
            _frame: &LumaFrame,
            _sensitivity: &Sensitivity,
        ) -> Result<Vec<Region>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.regions.clone())
        }
    }

    struct FailingDetector;

    impl RegionDetector for FailingDetector {
        fn detect(
            &self,
            _frame: &LumaFrame,
            _sensitivity: &Sensitivity,
        ) -> Result<Vec<Region>, DetectError> {
            Err("cascade state corrupt".into())
        }
    }

    struct PanickingDetector;

    impl RegionDetector for PanickingDetector {
        fn detect(
            &self,
            _frame: &LumaFrame,
            _sensitivity: &Sensitivity,
        ) -> Result<Vec<Region>, DetectError> {
            panic!("index out of range");
        }
    }

    fn entry(label: &str, detector: Arc<dyn RegionDetector>) -> DetectorEntry {
        DetectorEntry::new(label, label, Rgb::GREEN, Sensitivity::default(), detector)
    }

    fn frame() -> LumaFrame {
        LumaFrame::new(vec![0; 64 * 48], 64, 48)
    }

    #[rstest]
    #[case::sequential(ExecutionMode::Sequential)]
    #[case::parallel(ExecutionMode::Parallel)]
    fn test_candidates_follow_registry_order(#[case] mode: ExecutionMode) {
        let mut reg = DetectorRegistry::new();
        reg.register(entry(
            "a",
            Arc::new(FixedDetector::new(vec![
                Region::new(1, 1, 5, 5),
                Region::new(2, 2, 5, 5),
            ])),
        ))
        .unwrap();
        reg.register(entry(
            "b",
            Arc::new(FixedDetector::new(vec![Region::new(3, 3, 5, 5)])),
        ))
        .unwrap();

        let out = run_detection_pass(&reg.snapshot(), &frame(), mode);

        let got: Vec<_> = out
            .candidates
            .iter()
            .map(|c| (c.label.as_str(), c.order_index, c.region.x))
            .collect();
        assert_eq!(got, [("a", 0, 1), ("a", 0, 2), ("b", 1, 3)]);
        assert!(out.failures.is_empty());
    }

    #[rstest]
    #[case::sequential(ExecutionMode::Sequential)]
    #[case::parallel(ExecutionMode::Parallel)]
    fn test_failures_are_isolated(#[case] mode: ExecutionMode) {
        let mut reg = DetectorRegistry::new();
        reg.register(entry("broken", Arc::new(FailingDetector))).unwrap();
        reg.register(entry("panics", Arc::new(PanickingDetector))).unwrap();
        reg.register(entry(
            "ok",
            Arc::new(FixedDetector::new(vec![Region::new(4, 4, 2, 2)])),
        ))
        .unwrap();

        let out = run_detection_pass(&reg.snapshot(), &frame(), mode);

        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].label, "ok");
        assert_eq!(out.failures.len(), 2);
        assert!(matches!(
            out.failures[0].error,
            DetectorInvocationError::Failed { ref label, .. } if label == "broken"
        ));
        assert!(matches!(
            out.failures[1].error,
            DetectorInvocationError::Panicked { ref message, .. } if message == "index out of range"
        ));
    }

    #[test]
    fn test_disabled_entry_is_never_invoked() {
        let detector = FixedDetector::new(vec![Region::new(1, 1, 1, 1)]);
        let calls = detector.calls.clone();
        let mut reg = DetectorRegistry::new();
        reg.register(entry("off", Arc::new(detector))).unwrap();
        reg.set_enabled("off", false).unwrap();

        let out = run_detection_pass(&reg.snapshot(), &frame(), ExecutionMode::Sequential);

        assert!(out.candidates.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case::zero_width(Region::new(20, 20, 0, 8))]
    #[case::zero_height(Region::new(20, 20, 8, 0))]
    #[case::outside_frame(Region::new(64, 10, 4, 4))]
    fn test_unusable_regions_are_not_candidates(#[case] region: Region) {
        let mut reg = DetectorRegistry::new();
        reg.register(entry("stop", Arc::new(FixedDetector::new(vec![region]))))
            .unwrap();

        let out = run_detection_pass(&reg.snapshot(), &frame(), ExecutionMode::Sequential);

        assert!(out.candidates.is_empty());
        assert!(out.failures.is_empty());
    }

    #[test]
    fn test_regions_are_clipped_to_frame() {
        let mut reg = DetectorRegistry::new();
        reg.register(entry(
            "stop",
            Arc::new(FixedDetector::new(vec![Region::new(60, 40, 10, 10)])),
        ))
        .unwrap();

        let out = run_detection_pass(&reg.snapshot(), &frame(), ExecutionMode::Sequential);

        assert_eq!(out.candidates[0].region, Region::new(60, 40, 4, 8));
    }

    #[test]
    fn test_invocation_marks_detector_scope() {
        struct ScopeRecorder(Arc<AtomicUsize>);

        impl RegionDetector for ScopeRecorder {
            fn detect(
                &self,
                _frame: &LumaFrame,
                _sensitivity: &Sensitivity,
            ) -> Result<Vec<Region>, DetectError> {
                if IN_DETECTOR.with(Cell::get) {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
                Ok(vec![])
            }
        }

        let inside = Arc::new(AtomicUsize::new(0));
        let mut reg = DetectorRegistry::new();
        reg.register(entry("scoped", Arc::new(ScopeRecorder(inside.clone()))))
            .unwrap();
        reg.register(entry("panics", Arc::new(PanickingDetector))).unwrap();

        run_detection_pass(&reg.snapshot(), &frame(), ExecutionMode::Sequential);

        assert_eq!(inside.load(Ordering::SeqCst), 1);
        assert!(!IN_DETECTOR.with(Cell::get));
    }

    #[test]
    fn test_failure_exposes_detector_label() {
        let error = DetectorInvocationError::Panicked {
            label: "slippery".into(),
            message: "boom".into(),
        };
        assert_eq!(error.label(), "slippery");
    }

    #[test]
    fn test_empty_snapshot_yields_nothing() {
        let out = run_detection_pass(
            &RegistrySnapshot::default(),
            &frame(),
            ExecutionMode::Parallel,
        );
        assert!(out.candidates.is_empty());
        assert!(out.failures.is_empty());
    }
}
