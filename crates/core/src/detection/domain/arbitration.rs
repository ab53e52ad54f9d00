use crate::detection::domain::candidate::Candidate;
use crate::shared::constants::NO_DETECTION_LABEL;

/// Ranks candidates during arbitration. Higher wins.
pub trait CandidateScorer: Send + Sync {
    fn score(&self, candidate: &Candidate) -> u64;
}

/// Scores by the product of the region's top-left coordinates.
///
/// This is a positional heuristic: regions towards the bottom-right of the
/// frame always outrank others regardless of size.
#[derive(Clone, Copy, Debug, Default)]
pub struct PositionalScorer;

impl CandidateScorer for PositionalScorer {
    fn score(&self, candidate: &Candidate) -> u64 {
        candidate.region.x as u64 * candidate.region.y as u64
    }
}

/// Scores by region area.
#[derive(Clone, Copy, Debug, Default)]
pub struct AreaScorer;

impl CandidateScorer for AreaScorer {
    fn score(&self, candidate: &Candidate) -> u64 {
        candidate.region.area()
    }
}

/// Outcome of arbitration for one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionResult {
    NoDetection,
    Detected(Candidate),
}

impl DetectionResult {
    /// The label to publish: the winner's label, or the `"nothing"` sentinel.
    pub fn label(&self) -> &str {
        match self {
            DetectionResult::NoDetection => NO_DETECTION_LABEL,
            DetectionResult::Detected(c) => &c.label,
        }
    }

    pub fn winner(&self) -> Option<&Candidate> {
        match self {
            DetectionResult::NoDetection => None,
            DetectionResult::Detected(c) => Some(c),
        }
    }

    pub fn is_detection(&self) -> bool {
        matches!(self, DetectionResult::Detected(_))
    }
}

/// Picks at most one winning candidate per frame.
pub struct ArbitrationEngine {
    scorer: Box<dyn CandidateScorer>,
}

impl ArbitrationEngine {
    pub fn new(scorer: Box<dyn CandidateScorer>) -> Self {
        Self { scorer }
    }

    /// Highest score wins; equal scores go to the lowest `order_index`,
    /// then to the earlier candidate in the list.
    pub fn arbitrate(&self, candidates: &[Candidate]) -> DetectionResult {
        let mut best: Option<(u64, &Candidate)> = None;
        for candidate in candidates {
            let score = self.scorer.score(candidate);
            let replace = match best {
                None => true,
                Some((best_score, current)) => {
                    score > best_score
                        || (score == best_score && candidate.order_index < current.order_index)
                }
            };
            if replace {
                best = Some((score, candidate));
            }
        }
        match best {
            Some((_, winner)) => DetectionResult::Detected(winner.clone()),
            None => DetectionResult::NoDetection,
        }
    }
}

impl Default for ArbitrationEngine {
    fn default() -> Self {
        Self::new(Box::new(PositionalScorer))
    }
}
