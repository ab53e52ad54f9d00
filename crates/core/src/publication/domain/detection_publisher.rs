use std::fmt;

use thiserror::Error;

use crate::publication::domain::frame_encoder::EncodedImage;

/// The two independent outputs emitted per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Image,
    Label,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Image => f.write_str("image"),
            Topic::Label => f.write_str("label"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PublicationError {
    #[error("failed to encode frame {frame_index}: {source}")]
    Encode {
        frame_index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("{topic} topic is full, emission dropped")]
    Full { topic: Topic },
    #[error("{topic} topic has no subscriber")]
    Disconnected { topic: Topic },
    #[error("publisher I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write label record: {0}")]
    Csv(#[from] csv::Error),
}

/// The label emitted for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMessage {
    pub frame_index: usize,
    pub label: String,
}

/// Hands the per-frame outputs to whatever transport carries them.
///
/// Image and label are separate emissions with no joint atomicity: one may
/// succeed while the other fails.
pub trait DetectionPublisher: Send {
    fn publish_image(&mut self, image: &EncodedImage) -> Result<(), PublicationError>;

    fn publish_label(&mut self, message: &LabelMessage) -> Result<(), PublicationError>;

    /// Flushes buffered emissions. Default: no-op.
    fn flush(&mut self) -> Result<(), PublicationError> {
        Ok(())
    }
}
