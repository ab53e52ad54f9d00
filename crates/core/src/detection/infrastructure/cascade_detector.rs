use std::path::Path;

use image::imageops::FilterType;
use image::GrayImage;

use crate::detection::domain::region_detector::{DetectError, RegionDetector};
use crate::detection::domain::sensitivity::Sensitivity;
use crate::shared::luma_frame::LumaFrame;
use crate::shared::region::Region;

use super::haar_cascade::{CascadeError, CascadeModel, IntegralImage};

/// Relative tolerance used when clustering raw window hits.
const GROUP_EPS: f64 = 0.2;

/// Multi-scale sliding-window detector over a Haar cascade.
///
/// The frame is repeatedly downscaled by the sensitivity's scale factor
/// and scanned with the cascade's fixed window; raw hits are clustered and
/// clusters with too few members are discarded.
pub struct CascadeDetector {
    model: CascadeModel,
}

impl CascadeDetector {
    pub fn new(model: CascadeModel) -> Result<Self, CascadeError> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let model = CascadeModel::load(path)?;
        log::debug!(
            "Loaded cascade {} ({} stages, {}x{} window)",
            path.display(),
            model.stages.len(),
            model.window_width,
            model.window_height
        );
        Ok(Self { model })
    }

    fn scan(
        &self,
        frame: &LumaFrame,
        sensitivity: &Sensitivity,
    ) -> Result<Vec<Region>, DetectError> {
        let (fw, fh) = (frame.width(), frame.height());
        let (win_w, win_h) = (self.model.window_width, self.model.window_height);
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let sw = (fw as f64 / factor).round() as u32;
            let sh = (fh as f64 / factor).round() as u32;
            if sw < win_w || sh < win_h {
                break;
            }
            let scaled_win_w = (win_w as f64 * factor).round() as u32;
            let scaled_win_h = (win_h as f64 * factor).round() as u32;
            let too_small = sensitivity
                .min_size()
                .is_some_and(|(mw, mh)| scaled_win_w < mw || scaled_win_h < mh);

            if !too_small {
                let ii = integral_at_scale(frame, sw, sh)?;
                let step = if factor > 2.0 { 1 } else { 2 };
                for y in (0..=sh - win_h).step_by(step) {
                    for x in (0..=sw - win_w).step_by(step) {
                        if !self.model.accepts(&ii, x, y) {
                            continue;
                        }
                        let hit = Region::new(
                            (x as f64 * factor).round() as u32,
                            (y as f64 * factor).round() as u32,
                            scaled_win_w,
                            scaled_win_h,
                        );
                        if let Some(r) = hit.clamp_to(fw, fh) {
                            hits.push(r);
                        }
                    }
                }
            }
            factor *= sensitivity.scale_factor();
        }

        let grouped = group_rectangles(&hits, sensitivity.min_neighbors());
        Ok(match sensitivity.min_size() {
            Some((mw, mh)) => grouped
                .into_iter()
                .filter(|r| r.width >= mw && r.height >= mh)
                .collect(),
            None => grouped,
        })
    }
}

impl RegionDetector for CascadeDetector {
    fn detect(
        &self,
        frame: &LumaFrame,
        sensitivity: &Sensitivity,
    ) -> Result<Vec<Region>, DetectError> {
        self.scan(frame, sensitivity)
    }
}

fn integral_at_scale(frame: &LumaFrame, sw: u32, sh: u32) -> Result<IntegralImage, DetectError> {
    if sw == frame.width() && sh == frame.height() {
        return Ok(IntegralImage::new(frame.data(), sw, sh));
    }
    let img = GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("luminance buffer does not match frame dimensions")?;
    let scaled = image::imageops::resize(&img, sw, sh, FilterType::Triangle);
    Ok(IntegralImage::new(scaled.as_raw(), sw, sh))
}

#[derive(Clone, Copy)]
struct Rect {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

impl From<&Region> for Rect {
    fn from(r: &Region) -> Self {
        Self {
            x: r.x as i64,
            y: r.y as i64,
            w: r.width as i64,
            h: r.height as i64,
        }
    }
}

fn similar(a: &Rect, b: &Rect) -> bool {
    let delta = GROUP_EPS * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.x + a.w - b.x - b.w).abs() as f64 <= delta
        && (a.y + a.h - b.y - b.h).abs() as f64 <= delta
}

/// Clusters overlapping hits and averages each cluster.
///
/// Clusters with `min_neighbors` members or fewer are dropped, as are
/// clusters lying inside a better-supported one. With `min_neighbors == 0`
/// the raw hits are returned untouched.
pub fn group_rectangles(hits: &[Region], min_neighbors: u32) -> Vec<Region> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits.to_vec();
    }
    let rects: Vec<Rect> = hits.iter().map(Rect::from).collect();
    let labels = partition(&rects);
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut sums = vec![(0i64, 0i64, 0i64, 0i64); n_classes];
    let mut counts = vec![0u32; n_classes];
    for (r, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s.0 += r.x;
        s.1 += r.y;
        s.2 += r.w;
        s.3 += r.h;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let n = n as f64;
            Rect {
                x: (s.0 as f64 / n).round() as i64,
                y: (s.1 as f64 / n).round() as i64,
                w: (s.2 as f64 / n).round() as i64,
                h: (s.3 as f64 / n).round() as i64,
            }
        })
        .collect();

    let mut out = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.w as f64 * GROUP_EPS).round() as i64;
            let dy = (r2.h as f64 * GROUP_EPS).round() as i64;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.w <= r2.x + r2.w + dx
                && r1.y + r1.h <= r2.y + r2.h + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            out.push(Region::new(
                r1.x.max(0) as u32,
                r1.y.max(0) as u32,
                r1.w.max(0) as u32,
                r1.h.max(0) as u32,
            ));
        }
    }
    out
}

/// Union-find over the similarity relation; labels are dense and ordered
/// by first appearance.
fn partition(rects: &[Rect]) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j]) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut dense = vec![usize::MAX; rects.len()];
    let mut next = 0;
    (0..rects.len())
        .map(|i| {
            let root = find(&mut parent, i);
            if dense[root] == usize::MAX {
                dense[root] = next;
                next += 1;
            }
            dense[root]
        })
        .collect()
}
