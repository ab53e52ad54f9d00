use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_source::{FrameDecodeError, FrameSource};

use super::frame_decoder::decode_frame;

/// Reads a single image file, or every image in a directory in lexical
/// file-name order, as a stream of frames.
///
/// Files are decoded lazily as the pipeline pulls them. Frame indices are
/// positions in the sequence.
pub struct ImageSequenceReader {
    path: PathBuf,
    files: Option<Vec<PathBuf>>,
}

impl ImageSequenceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: None,
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl FrameSource for ImageSequenceReader {
    fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
        let files = if self.path.is_dir() {
            list_images(&self.path)?
        } else if self.path.is_file() {
            vec![self.path.clone()]
        } else {
            return Err(format!("input not found: {}", self.path.display()).into());
        };
        if files.is_empty() {
            return Err(format!("no image files in {}", self.path.display()).into());
        }

        log::debug!(
            "Opened {} ({} frame{})",
            self.path.display(),
            files.len(),
            if files.len() == 1 { "" } else { "s" }
        );
        let metadata = SourceMetadata {
            total_frames: Some(files.len()),
            source_path: Some(self.path.clone()),
        };
        self.files = Some(files);
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, FrameDecodeError>> + '_> {
        let Some(files) = self.files.take() else {
            return Box::new(std::iter::once(Err(FrameDecodeError::NotOpened)));
        };
        Box::new(files.into_iter().enumerate().map(|(index, path)| {
            let bytes = fs::read(&path).map_err(|source| FrameDecodeError::Io {
                index,
                path: path.clone(),
                source,
            })?;
            decode_frame(&bytes, index)
        }))
    }

    fn close(&mut self) {
        self.files = None;
    }
}
