use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

/// A frame that could not be turned into RGB pixels. The pipeline drops it
/// and moves on to the next one.
#[derive(Error, Debug)]
pub enum FrameDecodeError {
    #[error("frame {index}: failed to read {path}: {source}")]
    Io {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("frame source was not opened")]
    NotOpened,
}

/// Supplies decoded color frames, one per iteration step.
///
/// Implementations own their transport (files, a channel fed by a camera
/// bridge, ...). Failing to open is fatal; a single bad frame is not.
pub trait FrameSource: Send {
    /// Acquires the source and reports what is known about the stream.
    fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>>;

    /// Frames in arrival order. Blocks while waiting for the next frame.
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, FrameDecodeError>> + '_>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}
