use thiserror::Error;

use crate::shared::constants::{DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR};

#[derive(Error, Debug, PartialEq)]
pub enum SensitivityError {
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("minimum size must be non-zero, got {0}x{1}")]
    MinSize(u32, u32),
}

/// Fixed per-entry search configuration handed to a detector on every call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sensitivity {
    scale_factor: f64,
    min_neighbors: u32,
    min_size: Option<(u32, u32)>,
}

impl Sensitivity {
    pub fn new(
        scale_factor: f64,
        min_neighbors: u32,
        min_size: Option<(u32, u32)>,
    ) -> Result<Self, SensitivityError> {
        if !scale_factor.is_finite() || scale_factor <= 1.0 {
            return Err(SensitivityError::ScaleFactor(scale_factor));
        }
        if let Some((w, h)) = min_size {
            if w == 0 || h == 0 {
                return Err(SensitivityError::MinSize(w, h));
            }
        }
        Ok(Self {
            scale_factor,
            min_neighbors,
            min_size,
        })
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn min_neighbors(&self) -> u32 {
        self.min_neighbors
    }

    pub fn min_size(&self) -> Option<(u32, u32)> {
        self.min_size
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: None,
        }
    }
}
