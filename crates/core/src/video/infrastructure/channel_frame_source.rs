use crossbeam_channel::{Receiver, SendError, Sender};

use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_source::{FrameDecodeError, FrameSource};

use super::frame_decoder::decode_frame;

/// Producer half handed to the transport that receives compressed frames.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<Vec<u8>>,
}

impl FrameSender {
    /// Queues one compressed image. Blocks while the source is full.
    pub fn send(&self, payload: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.tx.send(payload)
    }
}

/// Push-model source: an external transport sends compressed images and
/// each one is decoded as it arrives.
///
/// The stream ends once every [`FrameSender`] is dropped.
pub struct ChannelFrameSource {
    rx: Option<Receiver<Vec<u8>>>,
}

impl ChannelFrameSource {
    pub fn new(capacity: usize) -> (Self, FrameSender) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { rx: Some(rx) }, FrameSender { tx })
    }
}

impl FrameSource for ChannelFrameSource {
    fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
        if self.rx.is_none() {
            return Err("channel frame source already closed".into());
        }
        Ok(SourceMetadata::live())
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, FrameDecodeError>> + '_> {
        match &self.rx {
            Some(rx) => Box::new(
                rx.iter()
                    .enumerate()
                    .map(|(index, payload)| decode_frame(&payload, index)),
            ),
            None => Box::new(std::iter::once(Err(FrameDecodeError::NotOpened))),
        }
    }

    fn close(&mut self) {
        self.rx = None;
    }
}
