use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::RgbImage;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::candidate::Candidate;
use crate::shared::color::Rgb;
use crate::shared::constants::{ANNOTATION_LINE_THICKNESS, CAPTION_OFFSET, CAPTION_SCALE};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Height of the caption marker drawn when no font is loaded.
const MARKER_HEIGHT: u32 = 4;
/// Marker width per caption character.
const MARKER_CHAR_WIDTH: u32 = 6;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("failed to read font {path}: {source}")]
    FontIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {path}: {source}")]
    InvalidFont {
        path: PathBuf,
        #[source]
        source: ab_glyph::InvalidFont,
    },
    #[error("annotator expects 3-channel RGB frames, got {0} channels")]
    UnsupportedChannels(u8),
}

/// Visual parameters shared by every caption and rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub line_thickness: u32,
    /// Vertical gap between the caption and the rectangle's top edge.
    pub caption_offset: i32,
    pub caption_scale: f32,
    /// `None` draws each caption in its candidate's color.
    pub caption_color: Option<Rgb>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            line_thickness: ANNOTATION_LINE_THICKNESS,
            caption_offset: CAPTION_OFFSET,
            caption_scale: CAPTION_SCALE,
            caption_color: Some(Rgb::GREEN),
        }
    }
}

/// Draws rectangles and captions with `imageproc`.
///
/// Captions need a TrueType font. Without one, each caption is rendered as
/// a solid marker bar sized to the caption length at the caption position.
pub struct ImageprocAnnotator {
    style: AnnotationStyle,
    font: Option<FontVec>,
}

impl ImageprocAnnotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style, font: None }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_font_file(self, path: &Path) -> Result<Self, AnnotationError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotationError::FontIo {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|source| AnnotationError::InvalidFont {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded caption font {}", path.display());
        Ok(self.with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_rectangle(&self, img: &mut RgbImage, region: &Region, color: image::Rgb<u8>) {
        // Outlines stack inwards so thick lines stay inside the region.
        for t in 0..self.style.line_thickness.max(1) {
            let (w, h) = (
                region.width.saturating_sub(2 * t),
                region.height.saturating_sub(2 * t),
            );
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((region.x + t) as i32, (region.y + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(img, rect, color);
        }
    }

    fn draw_caption(&self, img: &mut RgbImage, candidate: &Candidate) {
        let color: image::Rgb<u8> = self.style.caption_color.unwrap_or(candidate.color).into();
        let x = candidate.region.x as i32;
        let baseline = candidate.region.y as i32 - self.style.caption_offset;

        match &self.font {
            Some(font) => {
                let scale = PxScale::from(self.style.caption_scale);
                let (_, text_h) = text_size(scale, font, &candidate.caption);
                let top = baseline - text_h as i32;
                draw_text_mut(img, color, x, top, scale, font, &candidate.caption);
            }
            None => {
                let chars = candidate.caption.chars().count() as u32;
                if chars == 0 {
                    return;
                }
                let rect = Rect::at(x, baseline - MARKER_HEIGHT as i32)
                    .of_size(chars * MARKER_CHAR_WIDTH, MARKER_HEIGHT);
                draw_filled_rect_mut(img, rect, color);
            }
        }
    }
}

impl Default for ImageprocAnnotator {
    fn default() -> Self {
        Self::new(AnnotationStyle::default())
    }
}

impl FrameAnnotator for ImageprocAnnotator {
    fn annotate(
        &self,
        frame: &Frame,
        candidates: &[Candidate],
    ) -> Result<Frame, Box<dyn std::error::Error>> {
        if candidates.is_empty() {
            return Ok(frame.clone());
        }
        if frame.channels() != 3 {
            return Err(AnnotationError::UnsupportedChannels(frame.channels()).into());
        }

        let mut img = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("frame buffer does not match its dimensions")?;

        for candidate in candidates {
            self.draw_rectangle(&mut img, &candidate.region, candidate.color.into());
            self.draw_caption(&mut img, candidate);
        }

        Ok(Frame::new(
            img.into_raw(),
            frame.width(),
            frame.height(),
            3,
            frame.index(),
        ))
    }
}
