use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::opencv_cascade_xml::parse_opencv_cascade;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cascade {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
    #[serde(default)]
    pub tilted: bool,
}

/// Decision stump over one feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f64,
    pub weak_classifiers: Vec<WeakClassifier>,
}

/// Stump-based Haar cascade.
///
/// Loaded either from a trained OpenCV cascade (`.xml`) or from JSON whose
/// fields map one-to-one onto it: window size, stage thresholds, stump
/// thresholds with leaf values, and up to three weighted rectangles per
/// feature in window coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CascadeModel {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

impl CascadeModel {
    /// Reads a cascade, choosing the format by extension: `.xml` is
    /// OpenCV's trainer output, anything else is JSON.
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let text = fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let model = if is_xml {
            parse_opencv_cascade(&text)?
        } else {
            serde_json::from_str(&text).map_err(|source| CascadeError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), CascadeError> {
        // The variance window excludes a one-pixel border.
        if self.window_width < 3 || self.window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {}x{} is smaller than 3x3",
                self.window_width, self.window_height
            )));
        }
        if self.stages.is_empty() {
            return Err(CascadeError::Invalid("cascade has no stages".into()));
        }
        for (i, feature) in self.features.iter().enumerate() {
            if feature.tilted {
                return Err(CascadeError::Invalid(format!(
                    "feature {i} is tilted; only upright features are supported"
                )));
            }
            if feature.rects.is_empty() || feature.rects.len() > 3 {
                return Err(CascadeError::Invalid(format!(
                    "feature {i} has {} rects, expected 1 to 3",
                    feature.rects.len()
                )));
            }
            for r in &feature.rects {
                if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                    return Err(CascadeError::Invalid(format!(
                        "feature {i} rect exceeds the detection window"
                    )));
                }
            }
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.weak_classifiers.is_empty() {
                return Err(CascadeError::Invalid(format!("stage {s} is empty")));
            }
            if let Some(wc) = stage
                .weak_classifiers
                .iter()
                .find(|wc| wc.feature >= self.features.len())
            {
                return Err(CascadeError::Invalid(format!(
                    "stage {s} references missing feature {}",
                    wc.feature
                )));
            }
        }
        Ok(())
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The caller guarantees the window fits inside the integral image.
    pub fn accepts(&self, ii: &IntegralImage, x: u32, y: u32) -> bool {
        let nf = self.norm_factor(ii, x, y);
        self.stages.iter().all(|stage| {
            let sum: f64 = stage
                .weak_classifiers
                .iter()
                .map(|wc| {
                    let value = self.feature_value(ii, wc.feature, x, y) / nf;
                    if value < wc.threshold {
                        wc.left
                    } else {
                        wc.right
                    }
                })
                .sum();
            sum >= stage.threshold
        })
    }

    /// `area * stddev` over the window interior; 1.0 for flat windows.
    fn norm_factor(&self, ii: &IntegralImage, x: u32, y: u32) -> f64 {
        let w = self.window_width - 2;
        let h = self.window_height - 2;
        let area = (w as f64) * (h as f64);
        let sum = ii.sum(x + 1, y + 1, w, h) as f64;
        let sq_sum = ii.sq_sum(x + 1, y + 1, w, h) as f64;
        let var = area * sq_sum - sum * sum;
        if var > 0.0 {
            var.sqrt()
        } else {
            1.0
        }
    }

    fn feature_value(&self, ii: &IntegralImage, feature: usize, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight * ii.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn normalized_feature(
        &self,
        ii: &IntegralImage,
        feature: usize,
        x: u32,
        y: u32,
    ) -> f64 {
        self.feature_value(ii, feature, x, y) / self.norm_factor(ii, x, y)
    }
}

/// Summed-area tables of pixel values and squared pixel values.
pub struct IntegralImage {
    width: u32,
    height: u32,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    pub fn new(data: &[u8], width: u32, height: u32) -> Self {
        let stride = width as usize + 1;
        let rows = height as usize + 1;
        let mut sum = vec![0u64; stride * rows];
        let mut sq_sum = vec![0u64; stride * rows];
        for y in 0..height as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width as usize {
                let v = data[y * width as usize + x] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }
        Self {
            width,
            height,
            sum,
            sq_sum,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sum, self.width as usize + 1, x, y, w, h)
    }

    pub fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sq_sum, self.width as usize + 1, x, y, w, h)
    }

    fn rect(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }
}
