use std::path::PathBuf;

/// What a frame source knows about its stream before decoding starts.
///
/// Live transports cannot know the frame count, hence the `Option`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceMetadata {
    pub total_frames: Option<usize>,
    pub source_path: Option<PathBuf>,
}

impl SourceMetadata {
    pub fn live() -> Self {
        Self::default()
    }
}
