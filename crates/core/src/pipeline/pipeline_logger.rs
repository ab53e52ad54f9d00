use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::pipeline::detect_signs_use_case::FrameOutcome;

/// Timed steps of one frame's trip through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Decode,
    Detect,
    Arbitrate,
    Annotate,
    Publish,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Detect => "detect",
            Stage::Arbitrate => "arbitrate",
            Stage::Annotate => "annotate",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Observer for run events: stage timings, finished and dropped frames.
pub trait PipelineLogger: Send {
    /// `total` is 0 for live sources.
    fn progress(&mut self, processed: usize, total: usize);

    fn stage(&mut self, stage: Stage, duration_ms: f64);

    /// A frame whose result is being published.
    fn frame_done(&mut self, outcome: &FrameOutcome);

    /// A frame that never reached detection.
    fn frame_dropped(&mut self);

    /// Emit an end-of-run report. Default: no-op.
    fn summary(&self) {}
}

pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _processed: usize, _total: usize) {}
    fn stage(&mut self, _stage: Stage, _duration_ms: f64) {}
    fn frame_done(&mut self, _outcome: &FrameOutcome) {}
    fn frame_dropped(&mut self) {}
}

/// Running totals for one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageStats {
    pub count: usize,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl StageStats {
    fn record(&mut self, duration_ms: f64) {
        self.count += 1;
        self.total_ms += duration_ms;
        self.max_ms = self.max_ms.max(duration_ms);
    }

    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// Logs throttled progress and, at the end, what the run detected and where
/// the time went.
pub struct StdoutPipelineLogger {
    progress_every: usize,
    started: Instant,
    stages: BTreeMap<Stage, StageStats>,
    frames: usize,
    dropped: usize,
    candidates: usize,
    without_detection: usize,
    winners: BTreeMap<String, usize>,
    detector_failures: BTreeMap<String, usize>,
}

impl StdoutPipelineLogger {
    pub fn new(progress_every: usize) -> Self {
        Self {
            progress_every: progress_every.max(1),
            started: Instant::now(),
            stages: BTreeMap::new(),
            frames: 0,
            dropped: 0,
            candidates: 0,
            without_detection: 0,
            winners: BTreeMap::new(),
            detector_failures: BTreeMap::new(),
        }
    }

    pub fn stage_stats(&self, stage: Stage) -> StageStats {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Frames won per label; frames without a winner are not included.
    pub fn winners(&self) -> &BTreeMap<String, usize> {
        &self.winners
    }

    /// Frames on which each detector failed.
    pub fn detector_failures(&self) -> &BTreeMap<String, usize> {
        &self.detector_failures
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The end-of-run report, or `None` before any frame arrived.
    pub fn report(&self) -> Option<String> {
        if self.frames == 0 && self.dropped == 0 {
            return None;
        }

        let secs = self.started.elapsed().as_secs_f64();
        let mut out = format!("Run summary: {} frames in {secs:.1}s", self.frames);
        if secs > 0.0 {
            out.push_str(&format!(" ({:.1} fps)", self.frames as f64 / secs));
        }
        if self.dropped > 0 {
            out.push_str(&format!(", {} dropped", self.dropped));
        }

        if self.frames > 0 {
            let per_frame = self.candidates as f64 / self.frames as f64;
            out.push_str(&format!("\n  candidates per frame: {per_frame:.2}"));
        }
        let winners: Vec<String> = self
            .winners
            .iter()
            .map(|(label, n)| format!("{label} {n}"))
            .collect();
        out.push_str(&format!(
            "\n  winners: {}; no detection {}",
            if winners.is_empty() { "none".to_string() } else { winners.join(", ") },
            self.without_detection
        ));
        if !self.detector_failures.is_empty() {
            let failed: Vec<String> = self
                .detector_failures
                .iter()
                .map(|(label, n)| format!("{label} on {n} frames"))
                .collect();
            out.push_str(&format!("\n  detector failures: {}", failed.join(", ")));
        }

        for (stage, stats) in &self.stages {
            out.push_str(&format!(
                "\n  {stage:<10} avg {:7.2}ms  max {:7.2}ms",
                stats.avg_ms(),
                stats.max_ms
            ));
        }
        Some(out)
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, processed: usize, total: usize) {
        if processed % self.progress_every != 0 && processed != total {
            return;
        }
        if total == 0 {
            log::info!("Processed {processed} frames");
        } else {
            log::info!("Processed {processed}/{total} frames");
        }
    }

    fn stage(&mut self, stage: Stage, duration_ms: f64) {
        self.stages.entry(stage).or_default().record(duration_ms);
    }

    fn frame_done(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        self.candidates += outcome.candidates.len();
        match outcome.result.winner() {
            Some(winner) => *self.winners.entry(winner.label.clone()).or_default() += 1,
            None => self.without_detection += 1,
        }
        for failure in &outcome.failures {
            *self
                .detector_failures
                .entry(failure.error.label().to_string())
                .or_default() += 1;
        }
    }

    fn frame_dropped(&mut self) {
        self.dropped += 1;
    }

    fn summary(&self) {
        if let Some(text) = self.report() {
            log::info!("{text}");
        }
    }
}
